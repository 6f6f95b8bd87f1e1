//! E2E tests for `POST /api/v1/features/online`
//!
//! The registry is populated over HTTP, the online store directly (the way
//! a materialization job would), then features are read back through the
//! router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use featureloom_core::{EntityKey, OnlineRow, OnlineStore};
use featureloom_online::InMemoryOnlineStore;
use featureloom_registry::FeatureRegistry;
use featureloom_serving::ServingConfig;
use featureloom_server::{auth::AuthConfig, router, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Test Helper Functions
// ============================================================================

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Router with `driver_stats` (max_age 1h) registered and driver 5 stored
/// `age` ago
async fn create_driver_stats_app(age: Duration) -> (Router, Arc<InMemoryOnlineStore>) {
    let store = Arc::new(InMemoryOnlineStore::new());
    let state = AppState::new(
        FeatureRegistry::in_memory().await.unwrap(),
        store.clone(),
        ServingConfig::default(),
        AuthConfig::default(),
    );
    let app = router(state);

    let (status, _) = post_json(
        &app,
        "/api/v1/projects/default/entities",
        json!({"name": "driver_id", "value_type": "INT64"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post_json(
        &app,
        "/api/v1/projects/default/feature-tables",
        json!({
            "name": "driver_stats",
            "entities": ["driver_id"],
            "features": [
                {"name": "rating", "value_type": "FLOAT"},
                {"name": "trips_today", "value_type": "INT32"}
            ],
            "max_age": 3600,
            "batch_source": {
                "type": "BATCH_TABLE",
                "table_ref": "warehouse.driver_stats",
                "event_timestamp_column": "event_ts"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let ts = Utc::now() - age;
    store
        .write(
            "default",
            "driver_stats",
            vec![OnlineRow::new(EntityKey::new().with("driver_id", 5i64))
                .with_feature("rating", 4.5f32, ts)
                .with_feature("trips_today", 7i32, ts)],
        )
        .await
        .unwrap();

    (app, store)
}

fn driver_rows(ids: &[i64]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| json!({"fields": {"driver_id": {"int64_val": id}}}))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_e2e_online_features_fresh_value() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({
            "features": ["driver_stats:rating", "driver_stats:trips_today"],
            "entity_rows": driver_rows(&[5, 99])
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["field_names"],
        json!(["driver_stats:rating", "driver_stats:trips_today"])
    );
    assert_eq!(
        json["field_statuses"],
        json!([["PRESENT", "PRESENT"], ["NOT_FOUND", "NOT_FOUND"]])
    );
    assert_eq!(json["field_values"][0][0], json!({"float_val": 4.5}));
    assert_eq!(json["field_values"][0][1], json!({"int32_val": 7}));
    assert_eq!(json["field_values"][1], json!([null, null]));
}

#[tokio::test]
async fn test_e2e_online_features_outdated_value_omitted() {
    let (app, _) = create_driver_stats_app(Duration::seconds(3601)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({
            "project": "default",
            "features": [{"feature_table": "driver_stats", "name": "rating"}],
            "entity_rows": driver_rows(&[5])
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["field_statuses"], json!([["OUTDATED"]]));
    assert_eq!(json["field_values"], json!([[null]]));
}

#[tokio::test]
async fn test_e2e_online_features_entity_problems_are_slot_statuses() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({
            "features": ["driver_stats:rating"],
            "entity_rows": [
                {"fields": {"customer_id": {"string_val": "c1"}}},
                {"fields": {"driver_id": {"string_val": "5"}}}
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["field_statuses"],
        json!([["ENTITY_NOT_FOUND"], ["ERROR"]])
    );
}

#[tokio::test]
async fn test_e2e_online_features_unknown_reference_rejected() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({
            "features": ["driver_stats:acceptance_rate"],
            "entity_rows": driver_rows(&[5])
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "UNKNOWN_FEATURE");

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({"project": "fraud", "features": ["driver_stats:rating"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "UNKNOWN_FEATURE");
}

#[tokio::test]
async fn test_e2e_online_features_malformed_reference() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({"features": ["driver_stats.rating"], "entity_rows": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_e2e_online_features_empty_rows() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    let (status, json) = post_json(
        &app,
        "/api/v1/features/online",
        json!({"features": ["driver_stats:rating"], "entity_rows": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["field_names"], json!(["driver_stats:rating"]));
    assert_eq!(json["field_statuses"], json!([]));
    assert_eq!(json["field_values"], json!([]));
}

#[tokio::test]
async fn test_e2e_metrics_count_served_slots() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;
    post_json(
        &app,
        "/api/v1/features/online",
        json!({"features": ["driver_stats:rating"], "entity_rows": driver_rows(&[5])}),
    )
    .await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("featureloom_serving_slots_total"));
    assert!(text.contains("featureloom_online_request_duration_seconds"));
    assert!(text.contains("apply_feature_table"));
}

#[tokio::test]
async fn test_e2e_rejected_requests_do_not_grow_metric_labels() {
    let (app, _) = create_driver_stats_app(Duration::seconds(10)).await;

    // Given: Requests naming projects that do not exist
    for i in 0..20 {
        let (status, _) = post_json(
            &app,
            "/api/v1/features/online",
            json!({
                "project": format!("junk_project_{}", i),
                "features": ["driver_stats:rating"],
                "entity_rows": driver_rows(&[5])
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // When: Scraping metrics
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    // Then: No client-supplied value became a label
    assert!(text.contains("featureloom_online_request_rows"));
    assert!(!text.contains("junk_project_"));
}
