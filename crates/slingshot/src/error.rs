//! Error types for slingshot.
//!
//! Configuration problems ("fix my config") and connectivity problems
//! ("retry me") are kept in distinct variants so callers can tell them apart
//! without string matching. Item-level bulk failures are not errors of the
//! run: they are recorded in [`MigrationStats`](crate::pipeline::MigrationStats).

use thiserror::Error;

use crate::batch::ItemFailure;
use crate::pipeline::MigrationStats;

/// Result type alias for slingshot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating a collection.
///
/// Error codes follow the pattern `SLING-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid migration settings (SLING-001).
    ///
    /// Always raised before any store call is made.
    #[error("[SLING-001] Configuration error: {0}")]
    Config(String),

    /// Target collection absent at run start (SLING-002).
    #[error("[SLING-002] Target collection '{0}' does not exist")]
    TargetMissing(String),

    /// Transport failure during a store call (SLING-003).
    #[error("[SLING-003] Connection error: {0}")]
    Connection(String),

    /// Scroll token invalid or expired on advance (SLING-004).
    #[error("[SLING-004] Scroll cursor expired or invalid: {0}")]
    CursorExpired(String),

    /// The user transform signalled a failure (SLING-005).
    #[error("[SLING-005] Transform failed for document '{id}': {message}")]
    Transform {
        /// Identifier of the offending source document.
        id: String,
        /// Error reported by the transform.
        message: String,
    },

    /// Bulk writes completed with rejected items (SLING-006).
    ///
    /// Never raised by a run itself; see [`MigrationStats::ensure_clean`].
    #[error("[SLING-006] Bulk write rejected {} item(s)", .0.len())]
    BulkWrite(Vec<ItemFailure>),

    /// Schema fetch or apply failure during reconciliation (SLING-007).
    #[error("[SLING-007] Mapping conflict: {0}")]
    MappingConflict(String),

    /// Store refused the credentials (SLING-008).
    #[error("[SLING-008] Authentication failed: {0}")]
    Authentication(String),

    /// Store rejected the request (SLING-009).
    #[error("[SLING-009] Store rejected request (HTTP {status}): {message}")]
    Request {
        /// HTTP status code returned by the store.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// IO error (SLING-010).
    #[error("[SLING-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error (SLING-011).
    #[error("[SLING-011] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error (SLING-012).
    #[error("[SLING-012] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store did not acknowledge an alias change (SLING-013).
    #[error("[SLING-013] Alias update not acknowledged: {0}")]
    AliasNotAcknowledged(String),
}

impl Error {
    /// Returns the error code (e.g., "SLING-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "SLING-001",
            Self::TargetMissing(_) => "SLING-002",
            Self::Connection(_) => "SLING-003",
            Self::CursorExpired(_) => "SLING-004",
            Self::Transform { .. } => "SLING-005",
            Self::BulkWrite(_) => "SLING-006",
            Self::MappingConflict(_) => "SLING-007",
            Self::Authentication(_) => "SLING-008",
            Self::Request { .. } => "SLING-009",
            Self::Io(_) => "SLING-010",
            Self::Yaml(_) => "SLING-011",
            Self::Json(_) => "SLING-012",
            Self::AliasNotAcknowledged(_) => "SLING-013",
        }
    }

    /// Returns true if re-running the whole migration may succeed as is.
    ///
    /// The engine itself never retries; this only classifies the failure for
    /// callers that wrap `run` with their own policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::CursorExpired(_) | Self::Io(_)
        )
    }

    pub(crate) fn transform(id: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Transform {
            id: id.into(),
            message: format!("{err:#}"),
        }
    }
}

/// A migration run that aborted, with the progress made before the failure.
#[derive(Error, Debug)]
#[error(
    "migration aborted after {} read / {} written: {source}",
    .stats.docs_read,
    .stats.docs_written
)]
pub struct RunFailure {
    /// The fatal error.
    #[source]
    pub source: Error,
    /// Partial statistics up to the failure point.
    pub stats: MigrationStats,
}
