//! E2E tests for the registry REST API
//!
//! Drives the full router (auth in insecure mode, request ids, tracing) with
//! `oneshot` requests:
//! - Project lifecycle
//! - Entity and feature table apply/get/list/delete
//! - Error codes and HTTP statuses

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use featureloom_online::InMemoryOnlineStore;
use featureloom_registry::{FeatureRegistry, RegistryConfig};
use featureloom_serving::ServingConfig;
use featureloom_server::{auth::AuthConfig, router, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Test Helper Functions
// ============================================================================

async fn create_app_with(registry: FeatureRegistry) -> Router {
    let state = AppState::new(
        registry,
        Arc::new(InMemoryOnlineStore::new()),
        ServingConfig::default(),
        AuthConfig::default(),
    );
    router(state)
}

async fn create_app() -> Router {
    create_app_with(FeatureRegistry::in_memory().await.unwrap()).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn driver_entity() -> Value {
    json!({
        "name": "driver_id",
        "value_type": "INT64",
        "description": "Driver identifier",
        "labels": {"team": "pricing"}
    })
}

fn driver_stats_table() -> Value {
    json!({
        "name": "driver_stats",
        "entities": ["driver_id"],
        "features": [
            {"name": "rating", "value_type": "FLOAT"},
            {"name": "trips_today", "value_type": "INT32"}
        ],
        "max_age": 3600,
        "labels": {"team": "pricing", "tier": "gold"},
        "batch_source": {
            "type": "BATCH_FILE",
            "file_url": "s3://bucket/driver_stats",
            "file_format": "parquet",
            "event_timestamp_column": "event_ts"
        }
    })
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_e2e_project_lifecycle() {
    let app = create_app().await;

    // Default project exists from the start
    let (status, json) = send(&app, "GET", "/api/v1/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["projects"][0]["name"], "default");

    // Create
    let (status, json) = send(&app, "POST", "/api/v1/projects", Some(json!({"name": "fraud"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["name"], "fraud");
    assert_eq!(json["archived"], false);

    // Creating twice is rejected
    let (status, json) = send(&app, "POST", "/api/v1/projects", Some(json!({"name": "fraud"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");

    // Archive hides it from listing and blocks applies
    let (status, _) = send(&app, "POST", "/api/v1/projects/fraud/archive", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, json) = send(&app, "GET", "/api/v1/projects", None).await;
    assert_eq!(json["count"], 1);

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/fraud/entities",
        Some(driver_entity()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_e2e_default_project_cannot_be_archived() {
    let app = create_app().await;

    let (status, json) = send(&app, "POST", "/api/v1/projects/default/archive", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");

    let (status, json) = send(&app, "POST", "/api/v1/projects/nope/archive", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

// ============================================================================
// Entities
// ============================================================================

#[tokio::test]
async fn test_e2e_apply_and_get_entity() {
    let app = create_app().await;

    // When: Applied twice with the same spec
    let (status, first) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;

    // Then: The version does not move
    assert_eq!(first["meta"]["version"], 1);
    assert_eq!(second["meta"]["version"], 1);

    // A description change bumps it
    let mut changed = driver_entity();
    changed["description"] = json!("Driver identifier (updated)");
    let (_, third) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(changed),
    )
    .await;
    assert_eq!(third["meta"]["version"], 2);

    let (status, json) = send(&app, "GET", "/api/v1/projects/default/entities/driver_id", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["spec"]["value_type"], "INT64");
    assert_eq!(json["project"], "default");
}

#[tokio::test]
async fn test_e2e_entity_type_change_conflicts() {
    let app = create_app().await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;

    let mut changed = driver_entity();
    changed["value_type"] = json!("STRING");
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(changed),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "INCOMPATIBLE_SCHEMA");
}

#[tokio::test]
async fn test_e2e_list_entities_with_labels() {
    let app = create_app().await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(json!({"name": "customer_id", "value_type": "STRING", "labels": {"team": "growth"}})),
    )
    .await;

    let (_, json) = send(&app, "GET", "/api/v1/projects/default/entities", None).await;
    assert_eq!(json["count"], 2);

    let (_, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/entities?labels=team:pricing",
        None,
    )
    .await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["entities"][0]["spec"]["name"], "driver_id");

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/entities?labels=team",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_e2e_malformed_entity_body() {
    let app = create_app().await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(json!({"name": "driver_id", "value_type": "UUID"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(json!({"name": "bad name!", "value_type": "INT64"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Feature tables
// ============================================================================

#[tokio::test]
async fn test_e2e_feature_table_crud() {
    let app = create_app().await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;

    // Apply
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(driver_stats_table()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["version"], 1);
    assert_eq!(json["spec"]["max_age"], 3600);

    // Get
    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/feature-tables/driver_stats",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["spec"]["features"].as_array().unwrap().len(), 2);
    assert_eq!(json["spec"]["batch_source"]["type"], "BATCH_FILE");

    // List with filter
    let (_, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/feature-tables?labels=team:pricing,tier:gold",
        None,
    )
    .await;
    assert_eq!(json["count"], 1);
    let (_, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/feature-tables?labels=tier:silver",
        None,
    )
    .await;
    assert_eq!(json["count"], 0);

    // Delete
    let (status, _) = send(
        &app,
        "DELETE",
        "/api/v1/projects/default/feature-tables/driver_stats",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/projects/default/feature-tables/driver_stats",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, _) = send(
        &app,
        "DELETE",
        "/api/v1/projects/default/feature-tables/driver_stats",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_e2e_feature_table_validation_errors() {
    let app = create_app().await;

    // Unknown entity
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(driver_stats_table()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "UNKNOWN_ENTITY");

    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;

    // Duplicate feature
    let mut table = driver_stats_table();
    table["features"] = json!([
        {"name": "rating", "value_type": "FLOAT"},
        {"name": "rating", "value_type": "DOUBLE"}
    ]);
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(table),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "DUPLICATE_FEATURE");

    // Missing batch source
    let mut table = driver_stats_table();
    table["batch_source"] = Value::Null;
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(table),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "MISSING_SOURCE");

    // Nothing was stored by the failed applies
    let (_, json) = send(&app, "GET", "/api/v1/projects/default/feature-tables", None).await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_e2e_feature_table_type_change_conflicts() {
    let app = create_app().await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(driver_stats_table()),
    )
    .await;

    // Adding a feature and changing max_age is fine
    let mut table = driver_stats_table();
    table["features"]
        .as_array_mut()
        .unwrap()
        .push(json!({"name": "acceptance_rate", "value_type": "DOUBLE"}));
    table["max_age"] = json!(7200);
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(table),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["version"], 2);

    // Retyping a surviving feature is not
    let mut table = driver_stats_table();
    table["features"][0]["value_type"] = json!("DOUBLE");
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/projects/default/feature-tables",
        Some(table),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "INCOMPATIBLE_SCHEMA");
}

#[tokio::test]
async fn test_e2e_unknown_project_is_not_found() {
    let app = create_app().await;

    let (status, json) = send(&app, "GET", "/api/v1/projects/ghost/entities", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_e2e_sqlite_registry_survives_restart() {
    // Given: A registry file written through one server instance
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("registry.db");
    let config = RegistryConfig::sqlite(path.to_str().unwrap());

    let app = create_app_with(FeatureRegistry::new(config.clone()).await.unwrap()).await;
    send(
        &app,
        "POST",
        "/api/v1/projects/default/entities",
        Some(driver_entity()),
    )
    .await;
    drop(app);

    // When: A second instance opens the same file
    let app = create_app_with(FeatureRegistry::new(config).await.unwrap()).await;

    // Then: The entity is still there
    let (status, json) = send(&app, "GET", "/api/v1/projects/default/entities/driver_id", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["version"], 1);
}
