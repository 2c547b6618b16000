// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Slingshot
//!
//! `slingshot` copies documents from one search-engine collection into
//! another, transforming each document on the way, and can then move
//! aliases over to the new collection.
//!
//! ## Pipeline
//!
//! | Step | Component |
//! |------|-----------|
//! | Validate the migration | [`MigrationSpec::validate`] |
//! | Check the target exists, merge mapping overrides | [`mapping::MappingReconciler`] |
//! | Page through the source | [`scroll::ScrollCursor`] |
//! | Transform each document | [`Transform`] |
//! | Group writes into bulk calls | [`batch::BatchAccumulator`] |
//! | Cut aliases over | [`alias::AliasSwitcher`] |
//!
//! ## Quick Start
//!
//! ```bash
//! slingshot init --output migration.yaml
//! slingshot run --config migration.yaml --dry-run
//! slingshot run --config migration.yaml --switch-aliases
//! ```
//!
//! ## Library Use
//!
//! ```no_run
//! use std::sync::Arc;
//! use slingshot::{DocumentRecord, ElasticsearchStore, MigrationSpec, Pipeline, StoreAuth, TransformResult};
//!
//! # async fn migrate() -> anyhow::Result<()> {
//! let store = Arc::new(ElasticsearchStore::new("http://localhost:9200", StoreAuth::default())?);
//! let mut spec = MigrationSpec::new("sale", "sale_v2");
//! spec.bulk.max_batch_size = Some(500);
//!
//! let pipeline = Pipeline::new(store.clone(), store, spec);
//! let stats = pipeline
//!     .run(&mut |record: DocumentRecord| -> anyhow::Result<TransformResult> {
//!         Ok(TransformResult::keep(record))
//!     })
//!     .await?;
//! println!("{} documents written", stats.docs_written);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod alias;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod scroll;
pub mod store;
pub mod transform;

pub use alias::{AliasSwitch, AliasSwitcher};
pub use batch::{BulkBatch, BulkResult, ItemFailure};
pub use config::{BulkAction, Endpoint, MigrationConfig, MigrationOptions, MigrationSpec, PagingMode};
pub use document::{Document, DocumentRecord, Emitted, TransformResult};
pub use error::{Error, Result, RunFailure};
pub use pipeline::{MigrationStats, Pipeline};
pub use store::{DocumentStore, ElasticsearchStore, MemoryStore, StoreAuth};
pub use transform::{FieldTransformer, Identity, Transform, TransformConfig};
