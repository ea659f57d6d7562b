//! API integration tests for the TradeSync server
//!
//! Drive the full router (routing, JSON extraction, validation, coordinator,
//! in-memory store, audit archive) with `oneshot` requests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use tradesync_common::time::TimestampNormalizer;
use tradesync_server::{
    api,
    audit::{FileAuditSink, NoopAuditSink},
    config::Config,
    ingest::IngestService,
    store::MemoryStore,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_test_app(store: MemoryStore) -> Router {
    let service = IngestService::new(store, TimestampNormalizer::default(), Arc::new(NoopAuditSink));
    api::router(service, &Config::default().server)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, value)
}

async fn get_request(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_request(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

// ============================================================================
// Liveness
// ============================================================================

#[tokio::test]
async fn test_ping_get_and_post() {
    let app = create_test_app(MemoryStore::new());

    let (status, body) = get_request(&app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK" }));

    let (status, body) = post_request(&app, "/ping", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK" }));
}

#[tokio::test]
async fn test_health_with_memory_store() {
    let app = create_test_app(MemoryStore::new());

    let (status, body) = get_request(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

// ============================================================================
// Keyed kinds
// ============================================================================

#[tokio::test]
async fn test_open_inserts_then_updates_orders() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    let batch = json!([
        { "ticket": 5001, "symbol": "EURUSD", "type": 2, "state": 1,
          "time_setup": 1718452800, "time_setup_msc": 1718452800123_i64, "price_open": 1.0712 },
        { "ticket": 5002, "symbol": "GBPUSD", "type": 3, "state": 1 }
    ]);

    let (status, body) = post_request(&app, "/open", batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["message"], "Open order data saved successfully");
    assert_eq!(body["data"]["kind"], "order");
    assert_eq!(body["data"]["inserted"], 2);

    let (status, body) =
        post_request(&app, "/open", json!([{ "ticket": 5001, "symbol": "EURUSD", "state": 4 }]))
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 1);

    let orders = store.snapshot().await.orders;
    assert_eq!(orders.len(), 2);
    let order = &orders[&5001];
    assert_eq!(order.state, Some(4));
    assert_eq!(order.price_open, Some(1.0712));
    assert_eq!(order.order_type, Some(2));
    assert_eq!(
        order.time_setup_msc_normalized.unwrap().to_rfc3339(),
        "2024-06-15T17:00:00.123+08:00"
    );
}

#[tokio::test]
async fn test_close_stores_deals() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    let (status, body) = post_request(
        &app,
        "/close",
        json!([{ "ticket": 88, "symbol": "XAUUSD", "order": 5001, "entry": 1,
                 "time": 1734264000, "profit": 125.5 }]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Close order data saved successfully");

    let deal = &store.snapshot().await.deals[&88];
    assert_eq!(deal.order_ticket, Some(5001));
    assert_eq!(
        deal.time_normalized.unwrap().to_rfc3339(),
        "2024-12-15T18:00:00+08:00"
    );
}

#[tokio::test]
async fn test_account_upsert_by_login() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    post_request(
        &app,
        "/account",
        json!([{ "login": 1001, "balance": 5000.0, "currency": "USD", "name": "Main" }]),
    )
    .await;
    let (status, body) =
        post_request(&app, "/account", json!([{ "login": 1001, "balance": 5100.0 }])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Account data saved successfully");

    let accounts = store.snapshot().await.accounts;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[&1001].balance, Some(5100.0));
    assert_eq!(accounts[&1001].name.as_deref(), Some("Main"));
}

#[tokio::test]
async fn test_unknown_fields_are_ignored() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    let (status, _) = post_request(
        &app,
        "/close",
        json!([{ "ticket": 1, "symbol": "EURUSD", "broker_note": "n/a",
                 "time_normalized": "1999-01-01T00:00:00Z" }]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(store.snapshot().await.deals[&1].time_normalized.is_none());
}

// ============================================================================
// Positions
// ============================================================================

#[tokio::test]
async fn test_position_snapshot_replaces_and_clears() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    post_request(
        &app,
        "/position",
        json!([
            { "ticket": 1, "symbol": "EURUSD", "volume": 0.1 },
            { "ticket": 2, "symbol": "GBPUSD", "volume": 0.2 }
        ]),
    )
    .await;

    let (status, body) =
        post_request(&app, "/position", json!([{ "ticket": 3, "symbol": "USDJPY" }])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Position data saved successfully");
    assert_eq!(body["data"]["removed"], 2);

    let positions = store.snapshot().await.positions;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].ticket, 3);

    let (status, body) = post_request(&app, "/position", json!([])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["received"], 0);
    assert!(store.snapshot().await.positions.is_empty());
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_validation_error_touches_nothing() {
    let store = MemoryStore::new();
    let app = create_test_app(store.clone());

    let (status, body) = post_request(
        &app,
        "/open",
        json!([
            { "ticket": 10, "symbol": "EURUSD" },
            { "ticket": 11, "symbol": "" }
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["kind"], "order");
    assert!(body["error"]["message"].as_str().unwrap().contains("record 1"));
    assert!(store.snapshot().await.orders.is_empty());
}

#[tokio::test]
async fn test_missing_required_field_rejected() {
    let app = create_test_app(MemoryStore::new());

    let (status, _) = post_request(&app, "/open", json!([{ "symbol": "EURUSD" }])).await;
    assert!(status.is_client_error());

    let (status, _) = post_request(&app, "/account", json!({ "login": 1 })).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_get_on_ingest_route_not_allowed() {
    let app = create_test_app(MemoryStore::new());
    let (status, _) = get_request(&app, "/open").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

// ============================================================================
// Audit archive
// ============================================================================

#[tokio::test]
async fn test_raw_batch_archived_to_file() {
    let temp = TempDir::new().unwrap();
    let sink = FileAuditSink::new(temp.path()).unwrap();
    let service = IngestService::new(MemoryStore::new(), TimestampNormalizer::default(), Arc::new(sink));
    let app = api::router(service, &Config::default().server);

    let batch = json!([{ "ticket": 42, "symbol": "EURUSD", "time": 1718452800 }]);
    let (status, _) = post_request(&app, "/position", batch).await;
    assert_eq!(status, StatusCode::OK);

    let path = temp.path().join("positions.json");
    let mut archived = None;
    for _ in 0..50 {
        if let Ok(content) = std::fs::read_to_string(&path) {
            archived = Some(content);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let archived: Value = serde_json::from_str(&archived.expect("audit copy written")).unwrap();
    assert_eq!(archived[0]["ticket"], 42);
    assert_eq!(archived[0]["time"], 1718452800);
    assert!(archived[0].get("time_normalized").is_none());
}
