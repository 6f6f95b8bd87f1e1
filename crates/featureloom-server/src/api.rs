//! HTTP API handlers
//!
//! Registry management lives in [`registry`], feature retrieval in
//! [`serving`]. Handlers stay thin: extract, call the registry or the serving
//! engine, map the result.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

pub mod registry;
pub mod serving;

/// `GET /metrics` - Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::export_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to export metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
