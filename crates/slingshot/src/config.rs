//! Configuration types for slingshot.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::transform::TransformConfig;

/// Default number of documents requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default scroll context time-to-live.
pub const DEFAULT_SCROLL_TTL: &str = "30s";

/// Main migration file: hosts, the migration itself, and how to transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Store endpoints.
    pub hosts: HostsConfig,
    /// What to migrate and how to write it.
    #[serde(flatten)]
    pub spec: MigrationSpec,
    /// Config-driven document transform.
    #[serde(default)]
    pub transform: TransformConfig,
    /// Aliases to move from source to target.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Run options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Store hosts and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostsConfig {
    /// Source store URL (e.g., `http://localhost:9200`).
    pub source: String,
    /// Target store URL. Absent or equal to `source` means one shared connection.
    #[serde(default)]
    pub target: Option<String>,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl HostsConfig {
    /// Returns the target URL when it names a different server than the source.
    #[must_use]
    pub fn distinct_target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .filter(|t| !t.is_empty() && t.trim_end_matches('/') != self.source.trim_end_matches('/'))
    }
}

/// One migration: immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSpec {
    /// Collection to read from.
    pub source: Endpoint,
    /// Collection to write to.
    pub target: Endpoint,
    /// Bulk write settings.
    #[serde(default)]
    pub bulk: BulkConfig,
    /// Paging settings.
    #[serde(default)]
    pub paging: PagingConfig,
    /// Schema fragment merged into the source mapping and applied to the target.
    #[serde(default)]
    pub mapping_overrides: Option<Document>,
    /// Opaque store query selecting the documents to migrate (default: all).
    #[serde(default)]
    pub filter_query: Option<serde_json::Value>,
}

/// A collection on one side of the migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Collection (index) identifier.
    pub collection: String,
    /// Optional type/shape tag, for stores that still use mapping types.
    #[serde(default)]
    pub shape_tag: Option<String>,
    /// Page size hint for reads.
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Endpoint {
    /// Creates an endpoint with no shape tag and the default page size.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            shape_tag: None,
            page_size: None,
        }
    }

    /// Returns the shape tag when one is set and non-empty.
    #[must_use]
    pub fn shape(&self) -> Option<&str> {
        self.shape_tag.as_deref().filter(|s| !s.is_empty())
    }
}

/// Bulk write action applied to every transformed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Create or replace (default).
    #[default]
    Index,
    /// Create, failing if the identifier exists.
    Create,
    /// Partial update of an existing document.
    Update,
    /// Delete by identifier; the payload is ignored.
    Delete,
}

impl BulkAction {
    /// Action name as used in bulk headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether a payload line follows the header.
    #[must_use]
    pub const fn has_payload(self) -> bool {
        !matches!(self, Self::Delete)
    }
}

/// Bulk write settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Write action kind.
    #[serde(default)]
    pub action: BulkAction,
    /// Operations per bulk call. Unset flushes once per page.
    #[serde(default)]
    pub max_batch_size: Option<usize>,
}

/// How source pages are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingMode {
    /// Server-side scroll cursor over the full result set (default).
    #[default]
    Cursor,
    /// One bounded page at `batch_number * batch_size`.
    Offset,
}

/// Paging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Paging mode.
    #[serde(default)]
    pub mode: PagingMode,
    /// Page index for offset mode.
    #[serde(default)]
    pub batch_number: u64,
    /// Page length for offset mode (default: the source page size).
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Scroll context time-to-live for cursor mode.
    #[serde(default = "default_scroll_ttl")]
    pub scroll_ttl: String,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            mode: PagingMode::Cursor,
            batch_number: 0,
            batch_size: None,
            scroll_ttl: default_scroll_ttl(),
        }
    }
}

/// Run options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Transform and batch everything, but write to an in-memory store.
    #[serde(default)]
    pub dry_run: bool,
    /// Treat rejected bulk items as a failed run.
    #[serde(default)]
    pub strict: bool,
    /// Move the configured aliases once the data is copied.
    #[serde(default)]
    pub switch_aliases: bool,
}

fn default_scroll_ttl() -> String {
    DEFAULT_SCROLL_TTL.to_string()
}

impl MigrationSpec {
    /// Creates a spec copying `source` into `target` with default settings.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: Endpoint::new(source),
            target: Endpoint::new(target),
            bulk: BulkConfig::default(),
            paging: PagingConfig::default(),
            mapping_overrides: None,
            filter_query: None,
        }
    }

    /// Effective page size for cursor reads.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.source.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Effective page length for offset reads.
    #[must_use]
    pub fn offset_batch_size(&self) -> usize {
        self.paging.batch_size.unwrap_or_else(|| self.page_size())
    }

    /// First document of the offset window, or `None` if it overflows.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.paging
            .batch_number
            .checked_mul(self.offset_batch_size() as u64)
    }

    /// Validate the migration. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required field is missing or invalid.
    pub fn validate(&self) -> Result<()> {
        if self.source.collection.trim().is_empty() {
            return Err(Error::Config(
                "source collection cannot be empty".to_string(),
            ));
        }
        if self.target.collection.trim().is_empty() {
            return Err(Error::Config(
                "target collection cannot be empty".to_string(),
            ));
        }
        if self.source.page_size == Some(0) {
            return Err(Error::Config(
                "source page_size must be greater than 0".to_string(),
            ));
        }
        if self.bulk.max_batch_size == Some(0) {
            return Err(Error::Config(
                "bulk max_batch_size must be greater than 0".to_string(),
            ));
        }
        match self.paging.mode {
            PagingMode::Cursor if self.paging.scroll_ttl.trim().is_empty() => {
                return Err(Error::Config(
                    "paging scroll_ttl cannot be empty in cursor mode".to_string(),
                ));
            }
            PagingMode::Offset if self.paging.batch_size == Some(0) => {
                return Err(Error::Config(
                    "paging batch_size must be greater than 0".to_string(),
                ));
            }
            PagingMode::Offset if self.offset().is_none() => {
                return Err(Error::Config(format!(
                    "paging batch_number {} is out of range",
                    self.paging.batch_number
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate hosts, the migration spec and the transform settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.source.trim().is_empty() {
            return Err(Error::Config("source host cannot be empty".to_string()));
        }
        crate::store::common::validate_url(&self.hosts.source)?;
        if let Some(target) = self.hosts.distinct_target() {
            crate::store::common::validate_url(target)?;
        }
        if self.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::Config("alias names cannot be empty".to_string()));
        }
        self.spec.validate()?;
        self.transform.validate()
    }
}
