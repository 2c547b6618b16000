//! Document records and transform results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered, schema-less field map.
pub type Document = Map<String, Value>;

/// A document fetched from the source collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier in the source collection.
    pub id: String,
    /// Document body, field order preserved.
    pub fields: Document,
}

impl DocumentRecord {
    /// Creates a record from an identifier and a field map.
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a record from a JSON value, which must be an object.
    ///
    /// Returns `None` for any other JSON shape.
    pub fn from_value(id: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(id, fields)),
            _ => None,
        }
    }
}

/// One document produced by a transform, with an optional identifier.
///
/// When `id` is `None` the parent document's identifier is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    /// Document body to write.
    pub doc: Document,
    /// Explicit identifier in the target collection.
    pub id: Option<String>,
}

impl Emitted {
    /// A document that inherits its parent's identifier.
    pub fn inherit(doc: Document) -> Self {
        Self { doc, id: None }
    }

    /// A document with an explicit identifier.
    pub fn with_id(doc: Document, id: impl Into<String>) -> Self {
        Self {
            doc,
            id: Some(id.into()),
        }
    }
}

/// Outcome of transforming one source document.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformResult {
    /// Drop the document; nothing is written.
    Skip,
    /// Write exactly one document.
    Single(Emitted),
    /// Fan out into several documents, written in order.
    Many(Vec<Emitted>),
}

impl TransformResult {
    /// Writes the record back unchanged under its own identifier.
    pub fn keep(record: DocumentRecord) -> Self {
        Self::Single(Emitted::with_id(record.fields, record.id))
    }

    /// Writes `doc` under the parent identifier.
    pub fn single(doc: Document) -> Self {
        Self::Single(Emitted::inherit(doc))
    }

    /// Writes `doc` under an explicit identifier.
    pub fn single_with_id(doc: Document, id: impl Into<String>) -> Self {
        Self::Single(Emitted::with_id(doc, id))
    }

    /// Number of write operations this result will contribute.
    #[must_use]
    pub fn op_count(&self) -> usize {
        match self {
            Self::Skip => 0,
            Self::Single(_) => 1,
            Self::Many(docs) => docs.len(),
        }
    }

    /// Expands the result into `(id, document)` pairs.
    ///
    /// Sub-documents without an identifier take `parent_id`.
    pub fn into_pairs(self, parent_id: &str) -> Vec<(String, Document)> {
        let resolve = |e: Emitted| (e.id.unwrap_or_else(|| parent_id.to_string()), e.doc);
        match self {
            Self::Skip => Vec::new(),
            Self::Single(e) => vec![resolve(e)],
            Self::Many(docs) => docs.into_iter().map(resolve).collect(),
        }
    }
}
