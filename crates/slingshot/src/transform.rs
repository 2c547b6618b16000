//! Document transforms.
//!
//! Library callers usually pass a closure:
//!
//! ```
//! use slingshot::{DocumentRecord, TransformResult};
//!
//! let mut add_flag = |mut record: DocumentRecord| -> anyhow::Result<TransformResult> {
//!     record.fields.insert("migrated".into(), true.into());
//!     Ok(TransformResult::keep(record))
//! };
//! # let _ = slingshot::Transform::apply(&mut add_flag, DocumentRecord::new("1", Default::default()));
//! ```
//!
//! The CLI builds a [`FieldTransformer`] from the `transform:` section of the
//! migration file instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::document::{Document, DocumentRecord, Emitted, TransformResult};
use crate::error::{Error, Result};

/// Turns one source document into zero, one or many target documents.
///
/// A transform must only depend on the document and on what it captured;
/// returning an error aborts the run.
pub trait Transform: Send {
    /// Transforms one document.
    fn apply(&mut self, record: DocumentRecord) -> anyhow::Result<TransformResult>;
}

impl<F> Transform for F
where
    F: FnMut(DocumentRecord) -> anyhow::Result<TransformResult> + Send,
{
    fn apply(&mut self, record: DocumentRecord) -> anyhow::Result<TransformResult> {
        self(record)
    }
}

/// Copies every document unchanged under its own identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&mut self, record: DocumentRecord) -> anyhow::Result<TransformResult> {
        Ok(TransformResult::keep(record))
    }
}

/// Fan-out settings: one target document per element of an array field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Array field to split on.
    pub field: String,
    /// Field inside each element holding its identifier.
    #[serde(default)]
    pub id_field: Option<String>,
}

/// Field equality predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Top-level field name.
    pub field: String,
    /// Expected value.
    pub equals: Value,
}

/// Config-driven transform settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Field renames (`old -> new`).
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    /// Fields to drop.
    #[serde(default)]
    pub remove: Vec<String>,
    /// Fields to overwrite with constant values.
    #[serde(default)]
    pub set: Document,
    /// Optional fan-out.
    #[serde(default)]
    pub split: Option<SplitConfig>,
    /// Skip source documents that do not match.
    #[serde(default)]
    pub skip_unless: Option<FieldMatch>,
}

impl TransformConfig {
    /// Whether the transform copies documents unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.rename.is_empty()
            && self.remove.is_empty()
            && self.set.is_empty()
            && self.split.is_none()
            && self.skip_unless.is_none()
    }

    /// Validate transform settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on empty field names.
    pub fn validate(&self) -> Result<()> {
        if self
            .rename
            .iter()
            .any(|(from, to)| from.is_empty() || to.is_empty())
        {
            return Err(Error::Config(
                "transform rename entries cannot be empty".to_string(),
            ));
        }
        if let Some(split) = &self.split {
            if split.field.is_empty() {
                return Err(Error::Config(
                    "transform split field cannot be empty".to_string(),
                ));
            }
        }
        if let Some(predicate) = &self.skip_unless {
            if predicate.field.is_empty() {
                return Err(Error::Config(
                    "transform skip_unless field cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Applies a [`TransformConfig`].
///
/// Order: `skip_unless` on the source document, then rename, remove, set,
/// and finally split.
#[derive(Debug, Clone)]
pub struct FieldTransformer {
    config: TransformConfig,
}

impl FieldTransformer {
    /// Create a new transformer.
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    fn reshape(&self, fields: Document) -> Document {
        let mut out: Document = fields
            .into_iter()
            .filter_map(|(key, value)| {
                let key = self.config.rename.get(&key).cloned().unwrap_or(key);
                (!self.config.remove.contains(&key)).then_some((key, value))
            })
            .collect();
        for (key, value) in &self.config.set {
            out.insert(key.clone(), value.clone());
        }
        out
    }

    fn split(split: &SplitConfig, mut doc: Document) -> anyhow::Result<TransformResult> {
        let Some(Value::Array(elements)) = doc.remove(&split.field) else {
            return Ok(TransformResult::Skip);
        };

        let mut emitted = Vec::with_capacity(elements.len());
        for (i, element) in elements.into_iter().enumerate() {
            let Value::Object(sub) = element else {
                anyhow::bail!("element {} of '{}' is not an object", i, split.field);
            };
            let id = split
                .id_field
                .as_ref()
                .and_then(|f| sub.get(f))
                .and_then(id_string);
            emitted.push(Emitted { doc: sub, id });
        }
        Ok(TransformResult::Many(emitted))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Transform for FieldTransformer {
    fn apply(&mut self, record: DocumentRecord) -> anyhow::Result<TransformResult> {
        if let Some(predicate) = &self.config.skip_unless {
            if record.fields.get(&predicate.field) != Some(&predicate.equals) {
                return Ok(TransformResult::Skip);
            }
        }

        let doc = self.reshape(record.fields);
        match &self.config.split {
            Some(split) => Self::split(split, doc),
            None => Ok(TransformResult::single_with_id(doc, record.id)),
        }
    }
}
