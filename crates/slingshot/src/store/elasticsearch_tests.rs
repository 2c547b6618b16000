//! Tests for the Elasticsearch store.

use super::*;
use serde_json::json;

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn typed(collection: &str, tag: &str) -> Endpoint {
    let mut endpoint = Endpoint::new(collection);
    endpoint.shape_tag = Some(tag.to_string());
    endpoint
}

#[test]
fn test_store_rejects_invalid_url() {
    assert!(ElasticsearchStore::new("localhost:9200", StoreAuth::default()).is_err());
}

#[test]
fn test_store_trims_trailing_slash() {
    let store = ElasticsearchStore::new("http://localhost:9200/", StoreAuth::default()).unwrap();
    assert_eq!(store.url(), "http://localhost:9200");
    assert_eq!(store.kind(), "elasticsearch");
}

#[test]
fn test_collection_path() {
    assert_eq!(
        ElasticsearchStore::collection_path(&Endpoint::new("sale"), "_search"),
        "/sale/_search"
    );
    assert_eq!(
        ElasticsearchStore::collection_path(&typed("sale", "sale"), "_search"),
        "/sale/sale/_search"
    );
}

#[test]
fn test_mapping_path() {
    assert_eq!(
        ElasticsearchStore::mapping_path(&Endpoint::new("sale")),
        "/sale/_mapping"
    );
    assert_eq!(
        ElasticsearchStore::mapping_path(&typed("sale", "doc")),
        "/sale/_mapping/doc"
    );
}

#[test]
fn test_auth_from_hosts() {
    let hosts = HostsConfig {
        source: "http://localhost:9200".to_string(),
        target: None,
        username: Some("elastic".to_string()),
        password: Some("secret".to_string()),
        api_key: None,
    };
    let auth = StoreAuth::from_hosts(&hosts);
    assert_eq!(auth.username.as_deref(), Some("elastic"));
    assert!(auth.api_key.is_none());
}

#[test]
fn test_bulk_body_index() {
    let mut batch = BulkBatch::new(Endpoint::new("sale_v2"));
    batch.push(BulkAction::Index, "1".to_string(), doc(json!({"title": "a"})));
    batch.push(BulkAction::Index, "2".to_string(), doc(json!({"title": "b"})));

    let body = bulk_body(&batch).unwrap();
    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(body.ends_with('\n'));

    let header: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(header, json!({"index": {"_index": "sale_v2", "_id": "1"}}));
    let payload: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(payload, json!({"title": "a"}));
}

#[test]
fn test_bulk_body_typed_update_and_delete() {
    let mut batch = BulkBatch::new(typed("sale_v2", "sale"));
    batch.push(BulkAction::Update, "1".to_string(), doc(json!({"price": 3})));
    batch.push(BulkAction::Delete, "2".to_string(), doc(json!({"ignored": true})));

    let body = bulk_body(&batch).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        json!({"update": {"_index": "sale_v2", "_type": "sale", "_id": "1"}})
    );
    assert_eq!(lines[1], json!({"doc": {"price": 3}}));
    assert_eq!(
        lines[2],
        json!({"delete": {"_index": "sale_v2", "_type": "sale", "_id": "2"}})
    );
}

#[test]
fn test_bulk_outcomes_reads_item_errors() {
    let mut batch = BulkBatch::new(Endpoint::new("sale_v2"));
    batch.push(BulkAction::Index, "1".to_string(), doc(json!({})));
    batch.push(BulkAction::Index, "2".to_string(), doc(json!({})));

    let body: BulkResponseBody = serde_json::from_value(json!({
        "took": 3,
        "errors": true,
        "items": [
            {"index": {"_id": "1", "status": 201}},
            {"index": {"status": 400, "error": {
                "type": "mapper_parsing_exception",
                "reason": "failed to parse field [price]"
            }}}
        ]
    }))
    .unwrap();

    let response = bulk_outcomes(&batch, body);
    assert!(response.items[0].is_ok());
    assert_eq!(response.items[1].id, "2");
    assert_eq!(response.items[1].status, 400);
    assert_eq!(
        response.items[1].error.as_deref(),
        Some("mapper_parsing_exception: failed to parse field [price]")
    );
}

#[test]
fn test_search_response_numeric_total() {
    let response: SearchResponse = serde_json::from_value(json!({
        "_scroll_id": "c2Nhbg",
        "hits": {"total": 1250, "hits": [{"_id": "1", "_source": {"a": 1}}]}
    }))
    .unwrap();
    let page = SearchPage::from(response);
    assert_eq!(page.total, Some(1250));
    assert_eq!(page.scroll_id.as_deref(), Some("c2Nhbg"));
    assert_eq!(page.records[0].fields["a"], 1);
}

#[test]
fn test_search_response_object_total() {
    let response: SearchResponse = serde_json::from_value(json!({
        "hits": {"total": {"value": 7, "relation": "eq"}, "hits": [{"_id": "x"}]}
    }))
    .unwrap();
    let page = SearchPage::from(response);
    assert_eq!(page.total, Some(7));
    assert!(page.scroll_id.is_none());
    assert!(page.records[0].fields.is_empty());
}

#[test]
fn test_extract_mapping_untyped() {
    let response = doc(json!({
        "sale_2024": {"mappings": {"properties": {"id": {"type": "long"}}}}
    }));
    let mapping = extract_mapping(response, &Endpoint::new("sale")).unwrap();
    assert_eq!(mapping, doc(json!({"properties": {"id": {"type": "long"}}})));
}

#[test]
fn test_extract_mapping_typed() {
    let response = doc(json!({
        "sale": {"mappings": {"sale": {"properties": {"id": {"type": "long"}}}}}
    }));
    let mapping = extract_mapping(response, &typed("sale", "sale")).unwrap();
    assert_eq!(mapping, doc(json!({"properties": {"id": {"type": "long"}}})));
}

#[test]
fn test_extract_mapping_empty() {
    let response = doc(json!({"sale": {"mappings": {}}}));
    assert!(extract_mapping(response, &Endpoint::new("sale")).is_none());
}

#[test]
fn test_error_reason_fallbacks() {
    assert_eq!(error_reason(&json!({"type": "x"})), "x");
    assert_eq!(error_reason(&json!("plain")), "plain");
}
