//! FeatureLoom Server Library
//!
//! Exposes the HTTP layer for the binary and for integration tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use featureloom_server::{router, state::AppState};
//!
//! let state = AppState::new(registry, store, ServingConfig::default(), AuthConfig::default());
//! let app = router(state);
//! ```

use axum::{
    routing::{get, post},
    Router,
};

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod request_id;
pub mod shutdown;
pub mod state;

use state::AppState;

/// All routes with authentication, request ids, CORS and request tracing
///
/// Body-size and timeout limits are deployment settings and are layered on by
/// the binary.
pub fn router(state: AppState) -> Router {
    let auth = state.auth();

    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(api::metrics))
        .route(
            "/api/v1/projects",
            get(api::registry::list_projects).post(api::registry::create_project),
        )
        .route(
            "/api/v1/projects/:project/archive",
            post(api::registry::archive_project),
        )
        .route(
            "/api/v1/projects/:project/entities",
            get(api::registry::list_entities).post(api::registry::apply_entity),
        )
        .route(
            "/api/v1/projects/:project/entities/:name",
            get(api::registry::get_entity),
        )
        .route(
            "/api/v1/projects/:project/feature-tables",
            get(api::registry::list_feature_tables).post(api::registry::apply_feature_table),
        )
        .route(
            "/api/v1/projects/:project/feature-tables/:name",
            get(api::registry::get_feature_table).delete(api::registry::delete_feature_table),
        )
        .route(
            "/api/v1/features/online",
            post(api::serving::get_online_features),
        )
        .with_state(state)
        // Layers run bottom to top: trace, request id, CORS, auth
        .layer(axum::middleware::from_fn_with_state(
            auth,
            auth::auth_middleware,
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
