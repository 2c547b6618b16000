//! Paging over the source collection.
//!
//! ```text
//! Init -> Open -> (fetch -> more)* -> fetch -> Exhausted -> Closed
//!            \___________ any store failure ___________/-> Failed
//! ```
//!
//! In cursor mode the store keeps a scroll context alive for `scroll_ttl`
//! between fetches. In offset mode a single bounded page is read.

use tracing::{debug, info, warn};

use crate::config::{MigrationSpec, PagingMode};
use crate::document::DocumentRecord;
use crate::error::{Error, Result};
use crate::store::{DocumentStore, ScrollRequest, SearchPage};

/// Lifecycle of a [`ScrollCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, no store call made yet.
    Init,
    /// Query executed; pages may remain.
    Open,
    /// Last page delivered; the cursor still has to be released.
    Exhausted,
    /// Released.
    Closed,
    /// A store call failed; the run cannot continue.
    Failed,
}

/// One page of source documents.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Documents in fetch order. Empty means the source is exhausted.
    pub records: Vec<DocumentRecord>,
    /// Whether more documents are expected after this page.
    pub has_more: bool,
}

impl Page {
    fn empty() -> Self {
        Self::default()
    }

    /// Whether this page marks exhaustion.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owns the scroll state for one run.
pub struct ScrollCursor<'a> {
    store: &'a dyn DocumentStore,
    spec: &'a MigrationSpec,
    state: CursorState,
    scroll_id: Option<String>,
    buffered: Option<Vec<DocumentRecord>>,
    total: Option<u64>,
    yielded: u64,
}

impl<'a> ScrollCursor<'a> {
    /// Creates a cursor over `spec.source`. No I/O happens until [`open`](Self::open).
    pub fn new(store: &'a dyn DocumentStore, spec: &'a MigrationSpec) -> Self {
        Self {
            store,
            spec,
            state: CursorState::Init,
            scroll_id: None,
            buffered: None,
            total: None,
            yielded: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Total number of matching documents, when the store reported it.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Executes the filter query.
    ///
    /// # Errors
    ///
    /// Returns the store error and moves the cursor to [`CursorState::Failed`].
    pub async fn open(&mut self) -> Result<()> {
        if self.state != CursorState::Init {
            return Ok(());
        }

        let source = &self.spec.source;
        let query = self.spec.filter_query.as_ref();
        let opened = match self.spec.paging.mode {
            PagingMode::Cursor => {
                let request = ScrollRequest {
                    endpoint: source,
                    query,
                    page_size: self.spec.page_size(),
                    ttl: &self.spec.paging.scroll_ttl,
                };
                self.store.open_scroll(&request).await
            }
            PagingMode::Offset => {
                let limit = self.spec.offset_batch_size();
                match self.spec.offset() {
                    Some(offset) => self.store.search(source, query, offset, limit).await,
                    None => Err(Error::Config(format!(
                        "paging batch_number {} is out of range",
                        self.spec.paging.batch_number
                    ))),
                }
            }
        };

        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                self.state = CursorState::Failed;
                return Err(e);
            }
        };

        self.total = page.total;
        self.scroll_id = page.scroll_id;
        // A legacy scan search answers the opening call without hits.
        if !page.records.is_empty() || self.spec.paging.mode == PagingMode::Offset {
            self.buffered = Some(page.records);
        }
        self.state = CursorState::Open;

        info!(
            collection = %source.collection,
            mode = ?self.spec.paging.mode,
            total = ?self.total,
            "Opened source cursor"
        );
        Ok(())
    }

    /// Fetches the next page. An empty page means the source is exhausted and
    /// the cursor has been released.
    ///
    /// # Errors
    ///
    /// Returns the store error and moves the cursor to [`CursorState::Failed`].
    pub async fn next_page(&mut self) -> Result<Page> {
        match self.state {
            CursorState::Init => self.open().await?,
            CursorState::Open => {}
            CursorState::Exhausted => {
                self.release().await;
                return Ok(Page::empty());
            }
            CursorState::Closed => return Ok(Page::empty()),
            CursorState::Failed => {
                return Err(Error::Connection(
                    "source cursor failed earlier in this run".to_string(),
                ))
            }
        }

        let records = match self.buffered.take() {
            Some(records) => records,
            None => self.fetch().await?,
        };

        if records.is_empty() {
            self.state = CursorState::Exhausted;
            self.release().await;
            return Ok(Page::empty());
        }

        self.yielded += records.len() as u64;
        let has_more = match self.spec.paging.mode {
            PagingMode::Offset => {
                self.state = CursorState::Exhausted;
                false
            }
            PagingMode::Cursor => self.total.map_or(true, |total| self.yielded < total),
        };

        debug!(
            docs = records.len(),
            yielded = self.yielded,
            has_more,
            "Fetched source page"
        );
        Ok(Page { records, has_more })
    }

    async fn fetch(&mut self) -> Result<Vec<DocumentRecord>> {
        let Some(scroll_id) = self.scroll_id.clone() else {
            return Ok(Vec::new());
        };

        match self.store.scroll(&scroll_id, &self.spec.paging.scroll_ttl).await {
            Ok(SearchPage {
                records,
                scroll_id: next,
                total,
            }) => {
                if next.is_some() {
                    self.scroll_id = next;
                }
                if self.total.is_none() {
                    self.total = total;
                }
                Ok(records)
            }
            Err(e) => {
                self.state = CursorState::Failed;
                if !matches!(e, Error::CursorExpired(_)) {
                    if let Err(clear) = self.store.clear_scroll(&scroll_id).await {
                        debug!("Could not release failed cursor: {}", clear);
                    }
                }
                self.scroll_id = None;
                Err(e)
            }
        }
    }

    /// Releases the store-side context, if one is still held.
    ///
    /// Callers that stop reading before exhaustion must call this; a dropped
    /// cursor keeps its context alive on the store until the TTL lapses.
    /// A cursor that already failed stays [`CursorState::Failed`].
    pub async fn close(&mut self) {
        let failed = self.state == CursorState::Failed;
        self.release().await;
        if failed {
            self.state = CursorState::Failed;
        }
    }

    async fn release(&mut self) {
        if let Some(scroll_id) = self.scroll_id.take() {
            if let Err(e) = self.store.clear_scroll(&scroll_id).await {
                warn!("Failed to release source cursor: {}", e);
            }
        }
        self.state = CursorState::Closed;
    }
}
