//! Schema reconciliation between source and target collections.

use serde_json::Value;
use tracing::info;

use crate::config::MigrationSpec;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::store::DocumentStore;

/// Merges `overrides` into `base`.
///
/// For each key of `overrides`: when both sides hold objects they are merged
/// recursively, otherwise the override value replaces the existing one. Keys
/// absent from `overrides` are left untouched.
pub fn merge_mapping(base: &mut Document, overrides: &Document) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_mapping(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Applies `mapping_overrides` to the target before any data is copied.
pub struct MappingReconciler<'a> {
    source: &'a dyn DocumentStore,
    target: &'a dyn DocumentStore,
}

impl<'a> MappingReconciler<'a> {
    /// Creates a reconciler reading from `source` and writing to `target`.
    pub fn new(source: &'a dyn DocumentStore, target: &'a dyn DocumentStore) -> Self {
        Self { source, target }
    }

    /// Computes the schema that would be applied, without writing it.
    ///
    /// Returns `None` when the migration has no overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MappingConflict`] if the source schema cannot be read.
    pub async fn plan(&self, spec: &MigrationSpec) -> Result<Option<Document>> {
        let Some(overrides) = spec.mapping_overrides.as_ref().filter(|m| !m.is_empty()) else {
            return Ok(None);
        };

        let current = self
            .source
            .get_mapping(&spec.source)
            .await
            .map_err(|e| conflict("read source mapping", &spec.source.collection, &e))?;

        let merged = match current {
            Some(mut existing) if !existing.is_empty() => {
                merge_mapping(&mut existing, overrides);
                existing
            }
            _ => overrides.clone(),
        };
        Ok(Some(merged))
    }

    /// Merges the overrides into the source schema and applies the result to
    /// the target. Returns `false` when there is nothing to apply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MappingConflict`] if the schema cannot be read or
    /// the target does not acknowledge it.
    pub async fn reconcile(&self, spec: &MigrationSpec) -> Result<bool> {
        let Some(merged) = self.plan(spec).await? else {
            info!(
                collection = %spec.target.collection,
                "No mapping changes required"
            );
            return Ok(false);
        };

        let acknowledged = self
            .target
            .put_mapping(&spec.target, &merged)
            .await
            .map_err(|e| conflict("apply target mapping", &spec.target.collection, &e))?;

        if !acknowledged {
            return Err(Error::MappingConflict(format!(
                "mapping update for '{}' was not acknowledged",
                spec.target.collection
            )));
        }

        info!(
            collection = %spec.target.collection,
            fields = merged.len(),
            "Mapping successfully changed"
        );
        Ok(true)
    }
}

fn conflict(step: &str, collection: &str, err: &Error) -> Error {
    Error::MappingConflict(format!("failed to {} for '{}': {}", step, collection, err))
}
