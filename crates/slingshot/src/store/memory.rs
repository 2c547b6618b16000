//! In-process document store.
//!
//! Backs `--dry-run` (the target receives every write but nothing leaves the
//! process) and the test suite. Scrolls are point-in-time snapshots, so a
//! migration that rewrites a collection in place sees each document once.
//! Filters understand `match_all` and single-field `term` queries.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::batch::BulkBatch;
use crate::config::{BulkAction, Endpoint};
use crate::document::{Document, DocumentRecord};
use crate::error::{Error, Result};
use crate::store::{BulkItemOutcome, BulkResponse, DocumentStore, ScrollRequest, SearchPage};

#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    docs: BTreeMap<String, Document>,
    mapping: Option<Document>,
}

#[derive(Debug)]
struct ScrollContext {
    hits: Vec<DocumentRecord>,
    position: usize,
    page_size: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, MemoryCollection>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    scrolls: HashMap<String, ScrollContext>,
    rejected_ids: HashSet<String>,
    offline: bool,
    bulk_sizes: Vec<usize>,
}

impl MemoryState {
    fn ensure_online(&self) -> Result<()> {
        if self.offline {
            return Err(Error::Connection("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<&MemoryCollection> {
        self.collections.get(name).ok_or_else(|| missing_collection(name))
    }

    fn matching(&self, name: &str, query: Option<&Value>) -> Result<Vec<DocumentRecord>> {
        let collection = self.collection(name)?;
        let mut hits = Vec::new();
        for (id, doc) in &collection.docs {
            if matches_query(query, doc)? {
                hits.push(DocumentRecord::new(id.clone(), doc.clone()));
            }
        }
        Ok(hits)
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty collection if it does not exist yet.
    pub fn create(&self, collection: &str) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default();
    }

    /// Inserts or replaces a document, creating the collection if needed.
    pub fn insert(&self, collection: &str, id: impl Into<String>, doc: Document) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .docs
            .insert(id.into(), doc);
    }

    /// Returns every document of a collection, ordered by identifier.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<DocumentRecord> {
        self.state()
            .collections
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .map(|(id, doc)| DocumentRecord::new(id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns one document.
    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(id).cloned())
    }

    /// Number of documents in a collection (0 if absent).
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// Current schema of a collection.
    #[must_use]
    pub fn mapping(&self, collection: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .and_then(|c| c.mapping.clone())
    }

    /// Sets a collection's schema, creating the collection if needed.
    pub fn set_mapping(&self, collection: &str, mapping: Document) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .mapping = Some(mapping);
    }

    /// Attaches an alias without any existence check.
    pub fn attach_alias(&self, alias: &str, collection: &str) {
        self.state()
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(collection.to_string());
    }

    /// Makes every bulk write of `id` fail with a 400 item error.
    pub fn reject_id(&self, id: impl Into<String>) {
        self.state().rejected_ids.insert(id.into());
    }

    /// Makes every call fail with a connection error while `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Drops every open scroll context, as a store does when the TTL lapses.
    pub fn expire_scrolls(&self) {
        self.state().scrolls.clear();
    }

    /// Number of scroll contexts still open.
    #[must_use]
    pub fn open_scrolls(&self) -> usize {
        self.state().scrolls.len()
    }

    /// Operation counts of every bulk call received, in order.
    #[must_use]
    pub fn bulk_batch_sizes(&self) -> Vec<usize> {
        self.state().bulk_sizes.clone()
    }
}

fn missing_collection(name: &str) -> Error {
    Error::Request {
        status: 404,
        message: format!("index_not_found_exception: no such index [{}]", name),
    }
}

fn matches_query(query: Option<&Value>, doc: &Document) -> Result<bool> {
    let Some(query) = query else {
        return Ok(true);
    };
    if query.get("match_all").is_some() {
        return Ok(true);
    }
    if let Some(Value::Object(term)) = query.get("term") {
        if let Some((field, expected)) = term.iter().next() {
            let expected = expected.get("value").unwrap_or(expected);
            return Ok(doc.get(field) == Some(expected));
        }
    }
    Err(Error::Request {
        status: 400,
        message: format!("memory store cannot evaluate query {}", query),
    })
}

fn next_page(ctx: &mut ScrollContext) -> Vec<DocumentRecord> {
    let end = (ctx.position + ctx.page_size).min(ctx.hits.len());
    let page = ctx.hits[ctx.position..end].to_vec();
    ctx.position = end;
    page
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open_scroll(&self, request: &ScrollRequest<'_>) -> Result<SearchPage> {
        let mut state = self.state();
        state.ensure_online()?;
        let hits = state.matching(&request.endpoint.collection, request.query)?;
        let total = hits.len() as u64;

        let mut ctx = ScrollContext {
            hits,
            position: 0,
            page_size: request.page_size.max(1),
        };
        let records = next_page(&mut ctx);
        let scroll_id = uuid::Uuid::new_v4().to_string();
        state.scrolls.insert(scroll_id.clone(), ctx);

        Ok(SearchPage {
            records,
            scroll_id: Some(scroll_id),
            total: Some(total),
        })
    }

    async fn scroll(&self, scroll_id: &str, _ttl: &str) -> Result<SearchPage> {
        let mut state = self.state();
        state.ensure_online()?;
        let ctx = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| Error::CursorExpired(format!("no search context [{}]", scroll_id)))?;
        let total = ctx.hits.len() as u64;
        let records = next_page(ctx);

        Ok(SearchPage {
            records,
            scroll_id: Some(scroll_id.to_string()),
            total: Some(total),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state();
        state.ensure_online()?;
        state.scrolls.remove(scroll_id);
        Ok(())
    }

    async fn search(
        &self,
        endpoint: &Endpoint,
        query: Option<&Value>,
        offset: u64,
        limit: usize,
    ) -> Result<SearchPage> {
        let state = self.state();
        state.ensure_online()?;
        let hits = state.matching(&endpoint.collection, query)?;
        let total = hits.len() as u64;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let records = hits.into_iter().skip(skip).take(limit).collect();

        Ok(SearchPage {
            records,
            scroll_id: None,
            total: Some(total),
        })
    }

    async fn bulk(&self, batch: &BulkBatch) -> Result<BulkResponse> {
        let mut state = self.state();
        state.ensure_online()?;
        state.bulk_sizes.push(batch.len());

        let rejected = state.rejected_ids.clone();
        let collection = state
            .collections
            .entry(batch.target().collection.clone())
            .or_default();

        let mut items = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            let id = op.header.id.clone();
            if rejected.contains(&id) {
                items.push(BulkItemOutcome {
                    id,
                    status: 400,
                    error: Some("mapper_parsing_exception: document rejected".to_string()),
                });
                continue;
            }
            let payload = op.payload.clone().unwrap_or_default();
            let (status, error) = match op.header.action {
                BulkAction::Index => {
                    let created = collection.docs.insert(id.clone(), payload).is_none();
                    (if created { 201 } else { 200 }, None)
                }
                BulkAction::Create => {
                    if collection.docs.contains_key(&id) {
                        (
                            409,
                            Some(format!(
                                "version_conflict_engine_exception: [{}]: document already exists",
                                id
                            )),
                        )
                    } else {
                        collection.docs.insert(id.clone(), payload);
                        (201, None)
                    }
                }
                BulkAction::Update => match collection.docs.get_mut(&id) {
                    Some(existing) => {
                        existing.extend(payload);
                        (200, None)
                    }
                    None => (
                        404,
                        Some(format!("document_missing_exception: [{}]: document missing", id)),
                    ),
                },
                BulkAction::Delete => {
                    let found = collection.docs.remove(&id).is_some();
                    (if found { 200 } else { 404 }, None)
                }
            };
            items.push(BulkItemOutcome { id, status, error });
        }

        Ok(BulkResponse { items })
    }

    async fn get_mapping(&self, endpoint: &Endpoint) -> Result<Option<Document>> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.collection(&endpoint.collection)?.mapping.clone())
    }

    async fn put_mapping(&self, endpoint: &Endpoint, mapping: &Document) -> Result<bool> {
        let mut state = self.state();
        state.ensure_online()?;
        let collection = state
            .collections
            .get_mut(&endpoint.collection)
            .ok_or_else(|| missing_collection(&endpoint.collection))?;
        collection.mapping = Some(mapping.clone());
        Ok(true)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, body: Option<&Value>) -> Result<bool> {
        let mut state = self.state();
        state.ensure_online()?;
        if state.collections.contains_key(collection) {
            return Err(Error::Request {
                status: 400,
                message: format!(
                    "resource_already_exists_exception: index [{}] already exists",
                    collection
                ),
            });
        }
        let mapping = body
            .and_then(|b| b.get("mappings"))
            .and_then(Value::as_object)
            .cloned();
        state.collections.insert(
            collection.to_string(),
            MemoryCollection {
                docs: BTreeMap::new(),
                mapping,
            },
        );
        Ok(true)
    }

    async fn alias_holders(&self, alias: &str) -> Result<BTreeSet<String>> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.aliases.get(alias).cloned().unwrap_or_default())
    }

    async fn add_alias(&self, alias: &str, collection: &str) -> Result<bool> {
        let mut state = self.state();
        state.ensure_online()?;
        state.collection(collection)?;
        state
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(collection.to_string());
        Ok(true)
    }

    async fn remove_alias(&self, alias: &str, collection: &str) -> Result<bool> {
        let mut state = self.state();
        state.ensure_online()?;
        let removed = state
            .aliases
            .get_mut(alias)
            .is_some_and(|holders| holders.remove(collection));
        if !removed {
            return Err(Error::Request {
                status: 404,
                message: format!("aliases_not_found_exception: aliases [{}] missing", alias),
            });
        }
        if state.aliases.get(alias).is_some_and(BTreeSet::is_empty) {
            state.aliases.remove(alias);
        }
        Ok(true)
    }
}
