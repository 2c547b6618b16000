//! Document store clients.
//!
//! The engine only talks to a store through [`DocumentStore`]. Two
//! implementations ship with the crate: an Elasticsearch-compatible HTTP
//! client and an in-process memory store used for dry runs and tests.

pub mod common;
pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::batch::BulkBatch;
use crate::config::Endpoint;
use crate::document::{Document, DocumentRecord};
use crate::error::Result;

pub use elasticsearch::{ElasticsearchStore, StoreAuth};
pub use memory::MemoryStore;

/// Request opening a scroll cursor.
#[derive(Debug, Clone)]
pub struct ScrollRequest<'a> {
    /// Collection to read.
    pub endpoint: &'a Endpoint,
    /// Opaque filter query; `None` matches every document.
    pub query: Option<&'a serde_json::Value>,
    /// Documents per page.
    pub page_size: usize,
    /// Scroll context time-to-live (e.g. `30s`).
    pub ttl: &'a str,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Documents in this page.
    pub records: Vec<DocumentRecord>,
    /// Cursor token for the next page (scroll requests only).
    pub scroll_id: Option<String>,
    /// Total number of matching documents, when the store reports it.
    pub total: Option<u64>,
}

/// Per-item outcome of a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemOutcome {
    /// Document identifier.
    pub id: String,
    /// Item status code.
    pub status: u16,
    /// Failure reason; `None` if the item was applied.
    pub error: Option<String>,
}

impl BulkItemOutcome {
    /// Whether the item was applied.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Response to a bulk call that reached the store.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// Outcomes in request order.
    pub items: Vec<BulkItemOutcome>,
}

/// Client surface the migration engine consumes.
///
/// Every call is awaited to completion before the next one starts.
/// Transport failures must surface as [`Error::Connection`](crate::Error::Connection).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable store kind, for logs.
    fn kind(&self) -> &'static str;

    /// Runs the query and opens a scroll cursor.
    async fn open_scroll(&self, request: &ScrollRequest<'_>) -> Result<SearchPage>;

    /// Exchanges a cursor token for the next page and a refreshed token.
    async fn scroll(&self, scroll_id: &str, ttl: &str) -> Result<SearchPage>;

    /// Releases a cursor.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    /// Bounded query: `limit` documents starting at `offset`.
    async fn search(
        &self,
        endpoint: &Endpoint,
        query: Option<&serde_json::Value>,
        offset: u64,
        limit: usize,
    ) -> Result<SearchPage>;

    /// Writes a batch of operations.
    async fn bulk(&self, batch: &BulkBatch) -> Result<BulkResponse>;

    /// Reads a collection's schema; `None` if it has none.
    async fn get_mapping(&self, endpoint: &Endpoint) -> Result<Option<Document>>;

    /// Replaces or extends a collection's schema. Returns the acknowledged flag.
    async fn put_mapping(&self, endpoint: &Endpoint, mapping: &Document) -> Result<bool>;

    /// Whether the collection exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Creates a collection with an optional settings/mappings body.
    async fn create_collection(
        &self,
        collection: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<bool>;

    /// Collections currently holding `alias`.
    async fn alias_holders(&self, alias: &str) -> Result<BTreeSet<String>>;

    /// Attaches `alias` to `collection`.
    async fn add_alias(&self, alias: &str, collection: &str) -> Result<bool>;

    /// Detaches `alias` from `collection`.
    async fn remove_alias(&self, alias: &str, collection: &str) -> Result<bool>;
}
