use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{TimeDelta, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use shardwatch_backend::config::Config;
use shardwatch_backend::monitor::SharedStore;
use shardwatch_backend::reconcile::reconcile;
use shardwatch_backend::{RateLimitConfig, create_app};
use shardwatch_db::{Database, ServerSnapshot, ServerStatus, StateStore, Tier};
use tokio::sync::Mutex;
use tower::ServiceExt;
// for `oneshot` method

fn snapshot(name: &str, status: ServerStatus, tier: Tier, capacity: i64) -> ServerSnapshot {
    ServerSnapshot {
        name: name.to_string(),
        status,
        access_tier: tier,
        capacity,
        api_host: format!("{}.example", name.to_lowercase()),
    }
}

/// Helper to create a store with Hatchery (online, Beta 1) and Wyrmling (offline, IT)
async fn setup_test_store() -> SharedStore {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create in-memory database");
    let (mut store, _) = StateStore::load(db).await;
    reconcile(
        &mut store,
        &[
            snapshot("Hatchery", ServerStatus::Online, Tier::Beta1, 500),
            snapshot("Wyrmling", ServerStatus::Offline, Tier::InternalTest, 0),
        ],
        Utc::now(),
    );
    Arc::new(Mutex::new(store))
}

/// Helper to create app with default test configuration
fn create_test_app(store: SharedStore) -> axum::Router {
    let config = Config::default();
    create_app(
        store,
        config.request_body_limit,
        config.request_timeout,
        RateLimitConfig::default(),
        config.stale_after,
    )
}

/// Helper to send a GET and parse the JSON body
async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .method("GET")
        // the rate limiter keys on client address
        .header("X-Forwarded-For", "203.0.113.7")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(setup_test_store().await);
    let (status, _) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_servers_in_discovery_order() {
    let app = create_test_app(setup_test_store().await);

    let (status, body) = get(app, "/servers").await;

    assert_eq!(status, StatusCode::OK);
    let servers = body["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0]["name"], "Hatchery");
    assert_eq!(servers[1]["name"], "Wyrmling");
}

#[tokio::test]
async fn test_get_server_shows_record_and_flags() {
    let app = create_test_app(setup_test_store().await);

    let (status, body) = get(app, "/servers/Hatchery").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Hatchery");
    assert_eq!(body["status"], "Online");
    assert_eq!(body["access_tier"], "Beta1");
    assert_eq!(body["capacity"], 500);
    assert_eq!(body["api_host"], "hatchery.example");
    assert_eq!(body["tier_gates"]["InternalTest"], true);
    assert_eq!(body["tier_gates"]["Beta1"], true);
    assert_eq!(body["tier_gates"]["Beta2"], false);
    assert_eq!(body["pending"], false);
    assert_eq!(body["stale"], false);
    assert!(body["last_seen"].is_string());
}

#[tokio::test]
async fn test_get_server_reports_pending_change() {
    let store = setup_test_store().await;
    {
        let mut guard = store.lock().await;
        reconcile(
            &mut guard,
            &[snapshot("Wyrmling", ServerStatus::Online, Tier::InternalTest, 50)],
            Utc::now() + TimeDelta::seconds(1),
        );
    }
    let app = create_test_app(store);

    let (status, body) = get(app, "/servers/Wyrmling").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Online");
    assert_eq!(body["pending"], true);
    assert_eq!(body["tier_gates"]["InternalTest"], false);
}

#[tokio::test]
async fn test_get_server_reports_stale() {
    let store = setup_test_store().await;
    {
        let mut guard = store.lock().await;
        let record = guard.find_mut("Wyrmling").unwrap();
        record.last_seen = Utc::now() - TimeDelta::hours(1);
    }
    let app = create_test_app(store);

    let (_, body) = get(app, "/servers/Wyrmling").await;

    assert_eq!(body["stale"], true);
}

#[tokio::test]
async fn test_get_unknown_server() {
    let app = create_test_app(setup_test_store().await);

    let (status, body) = get(app, "/servers/Nowhere").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Server not found");
    assert_eq!(body["details"], "Nowhere");
}

#[tokio::test]
async fn test_get_server_name_too_long() {
    let app = create_test_app(setup_test_store().await);
    let uri = format!("/servers/{}", "a".repeat(101));

    let (status, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too long"));
}

#[tokio::test]
async fn test_empty_store_lists_nothing() {
    let db = Database::open_in_memory().await.unwrap();
    let (store, _) = StateStore::load(db).await;
    let app = create_test_app(Arc::new(Mutex::new(store)));

    let (status, body) = get(app, "/servers").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "servers": [] }));
}
