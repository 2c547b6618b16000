//! Elasticsearch/OpenSearch document store.
//!
//! Speaks the REST API directly: scroll search, bulk NDJSON, mapping and
//! alias endpoints. Collections may carry a legacy mapping type
//! (`shape_tag`), which is appended to index-level paths and bulk headers.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

use crate::batch::BulkBatch;
use crate::config::{BulkAction, Endpoint, HostsConfig};
use crate::document::{Document, DocumentRecord};
use crate::error::{Error, Result};
use crate::store::common::{connection_error, create_http_client, handle_http_error, validate_url};
use crate::store::{BulkItemOutcome, BulkResponse, DocumentStore, ScrollRequest, SearchPage};

/// Credentials sent with every request. An API key wins over basic auth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreAuth {
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

impl StoreAuth {
    /// Takes the credentials of a hosts section.
    #[must_use]
    pub fn from_hosts(hosts: &HostsConfig) -> Self {
        Self {
            username: hosts.username.clone(),
            password: hosts.password.clone(),
            api_key: hosts.api_key.clone(),
        }
    }
}

/// Search response body.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsContainer,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is a bare number before 7.0 and an object after.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl From<SearchResponse> for SearchPage {
    fn from(response: SearchResponse) -> Self {
        let records = response
            .hits
            .hits
            .into_iter()
            .map(|hit| match hit.source {
                Value::Object(fields) => DocumentRecord::new(hit.id, fields),
                _ => DocumentRecord::new(hit.id, Document::new()),
            })
            .collect();
        Self {
            records,
            scroll_id: response.scroll_id,
            total: response.hits.total.as_ref().map(TotalHits::value),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponseBody {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

/// Elasticsearch-compatible HTTP store.
pub struct ElasticsearchStore {
    url: String,
    auth: StoreAuth,
    client: Client,
}

impl ElasticsearchStore {
    /// Creates a store client with a configured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not http(s).
    pub fn new(url: impl Into<String>, auth: StoreAuth) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            auth,
            client: create_http_client(),
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds `/{index}[/{type}]/{suffix}`.
    fn collection_path(endpoint: &Endpoint, suffix: &str) -> String {
        let mut path = format!("/{}", endpoint.collection.trim_start_matches('/'));
        if let Some(tag) = endpoint.shape() {
            path.push('/');
            path.push_str(tag);
        }
        if !suffix.is_empty() {
            path.push('/');
            path.push_str(suffix);
        }
        path
    }

    /// Builds `/{index}/_mapping[/{type}]`.
    fn mapping_path(endpoint: &Endpoint) -> String {
        let mut path = format!("/{}/_mapping", endpoint.collection.trim_start_matches('/'));
        if let Some(tag) = endpoint.shape() {
            path.push('/');
            path.push_str(tag);
        }
        path
    }

    /// Makes an authenticated request.
    fn build_request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, format!("{}{}", self.url, path));

        // Apply authentication
        if let Some(api_key) = &self.auth.api_key {
            req = req.header("Authorization", format!("ApiKey {}", api_key));
        } else if let Some(user) = &self.auth.username {
            req = req.basic_auth(user, self.auth.password.as_ref());
        }

        req
    }

    /// Sends a request, mapping transport and HTTP failures.
    async fn send(&self, req: RequestBuilder, operation: &str) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| connection_error(&e, operation))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(handle_http_error(status, &body, operation))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| Error::Connection(format!("Failed to parse {} response: {}", operation, e)))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, operation: &str) -> Result<T> {
        let response = self.send(req, operation).await?;
        Self::read_json(response, operation).await
    }

    async fn acknowledged(&self, req: RequestBuilder, operation: &str) -> Result<bool> {
        let ack: Acknowledged = self.send_json(req, operation).await?;
        Ok(ack.acknowledged)
    }
}

fn query_or_match_all(query: Option<&Value>) -> Value {
    query.cloned().unwrap_or_else(|| json!({ "match_all": {} }))
}

/// Serializes a batch as bulk NDJSON, one header line and at most one
/// payload line per operation.
fn bulk_body(batch: &BulkBatch) -> Result<String> {
    let target = batch.target();
    let mut body = String::new();

    for op in batch.ops() {
        let mut meta = Map::new();
        meta.insert("_index".to_string(), Value::String(target.collection.clone()));
        if let Some(tag) = target.shape() {
            meta.insert("_type".to_string(), Value::String(tag.to_string()));
        }
        meta.insert("_id".to_string(), Value::String(op.header.id.clone()));

        let mut header = Map::new();
        header.insert(op.header.action.as_str().to_string(), Value::Object(meta));
        body.push_str(&serde_json::to_string(&header)?);
        body.push('\n');

        if let Some(payload) = &op.payload {
            let line = match op.header.action {
                BulkAction::Update => serde_json::to_string(&json!({ "doc": payload }))?,
                _ => serde_json::to_string(payload)?,
            };
            body.push_str(&line);
            body.push('\n');
        }
    }

    Ok(body)
}

/// Reads per-item outcomes, falling back to the request's ids when an item
/// omits `_id`.
fn bulk_outcomes(batch: &BulkBatch, body: BulkResponseBody) -> BulkResponse {
    let items = body
        .items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let result = item.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null);
            let id = result
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| batch.ops().get(i).map(|op| op.header.id.clone()))
                .unwrap_or_default();
            let status = result
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(0);
            let error = result.get("error").map(error_reason);
            BulkItemOutcome { id, status, error }
        })
        .collect();
    BulkResponse { items }
}

fn error_reason(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        _ => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// Pulls the schema out of a `GET _mapping` answer.
///
/// The answer is keyed by concrete index name (which differs from the
/// requested one when an alias is used); typed indices nest one more level.
fn extract_mapping(response: Map<String, Value>, endpoint: &Endpoint) -> Option<Document> {
    let (_, index) = response.into_iter().next()?;
    let Value::Object(mut mappings) = index.get("mappings")?.clone() else {
        return None;
    };
    if let Some(tag) = endpoint.shape() {
        if let Some(Value::Object(typed)) = mappings.remove(tag) {
            mappings = typed;
        }
    }
    (!mappings.is_empty()).then_some(mappings)
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    fn kind(&self) -> &'static str {
        "elasticsearch"
    }

    async fn open_scroll(&self, request: &ScrollRequest<'_>) -> Result<SearchPage> {
        let path = Self::collection_path(request.endpoint, "_search");
        let body = json!({
            "size": request.page_size,
            "query": query_or_match_all(request.query),
            "sort": ["_doc"],
        });

        debug!(path = %path, ttl = request.ttl, "Opening scroll");
        let req = self
            .build_request(Method::POST, &path)
            .query(&[("scroll", request.ttl)])
            .json(&body);
        let response: SearchResponse = self.send_json(req, "open scroll").await?;
        Ok(response.into())
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> Result<SearchPage> {
        let req = self
            .build_request(Method::POST, "/_search/scroll")
            .json(&json!({ "scroll": ttl, "scroll_id": scroll_id }));

        match self.send_json::<SearchResponse>(req, "scroll").await {
            Ok(response) => Ok(response.into()),
            Err(Error::Request { status: 404, message }) => Err(Error::CursorExpired(message)),
            Err(e) => Err(e),
        }
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let req = self
            .build_request(Method::DELETE, "/_search/scroll")
            .json(&json!({ "scroll_id": [scroll_id] }));

        match self.send(req, "clear scroll").await {
            Ok(_) | Err(Error::Request { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn search(
        &self,
        endpoint: &Endpoint,
        query: Option<&Value>,
        offset: u64,
        limit: usize,
    ) -> Result<SearchPage> {
        let path = Self::collection_path(endpoint, "_search");
        let body = json!({
            "from": offset,
            "size": limit,
            "query": query_or_match_all(query),
            "sort": ["_doc"],
        });

        let req = self.build_request(Method::POST, &path).json(&body);
        let response: SearchResponse = self.send_json(req, "search").await?;
        Ok(response.into())
    }

    async fn bulk(&self, batch: &BulkBatch) -> Result<BulkResponse> {
        if batch.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = bulk_body(batch)?;
        let req = self
            .build_request(Method::POST, "/_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body);

        let response: BulkResponseBody = self.send_json(req, "bulk").await?;
        Ok(bulk_outcomes(batch, response))
    }

    async fn get_mapping(&self, endpoint: &Endpoint) -> Result<Option<Document>> {
        let req = self.build_request(Method::GET, &Self::mapping_path(endpoint));
        let response: Map<String, Value> = self.send_json(req, "get mapping").await?;
        Ok(extract_mapping(response, endpoint))
    }

    async fn put_mapping(&self, endpoint: &Endpoint, mapping: &Document) -> Result<bool> {
        let req = self
            .build_request(Method::PUT, &Self::mapping_path(endpoint))
            .json(mapping);
        self.acknowledged(req, "put mapping").await
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let req = self.build_request(Method::HEAD, &format!("/{}", collection));
        match self.send(req, "collection exists").await {
            Ok(_) => Ok(true),
            Err(Error::Request { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_collection(&self, collection: &str, body: Option<&Value>) -> Result<bool> {
        let mut req = self.build_request(Method::PUT, &format!("/{}", collection));
        if let Some(body) = body {
            req = req.json(body);
        }
        self.acknowledged(req, "create collection").await
    }

    async fn alias_holders(&self, alias: &str) -> Result<BTreeSet<String>> {
        let req = self.build_request(Method::GET, &format!("/_alias/{}", alias));
        match self.send_json::<Map<String, Value>>(req, "get alias").await {
            Ok(holders) => Ok(holders.into_iter().map(|(index, _)| index).collect()),
            Err(Error::Request { status: 404, .. }) => Ok(BTreeSet::new()),
            Err(e) => Err(e),
        }
    }

    async fn add_alias(&self, alias: &str, collection: &str) -> Result<bool> {
        let req = self.build_request(Method::POST, "/_aliases").json(&json!({
            "actions": [{ "add": { "index": collection, "alias": alias } }]
        }));
        self.acknowledged(req, "add alias").await
    }

    async fn remove_alias(&self, alias: &str, collection: &str) -> Result<bool> {
        let req = self.build_request(Method::POST, "/_aliases").json(&json!({
            "actions": [{ "remove": { "index": collection, "alias": alias } }]
        }));
        self.acknowledged(req, "remove alias").await
    }
}

#[cfg(test)]
#[path = "elasticsearch_tests.rs"]
mod tests;
