//! Online feature retrieval
//!
//! `POST /api/v1/features/online`
//!
//! ## Request Body
//! ```json
//! {
//!   "project": "default",
//!   "features": ["driver_stats:rating", "fraud/txn_stats:count_1h"],
//!   "entity_rows": [{"fields": {"driver_id": {"int64_val": 5}}}]
//! }
//! ```
//!
//! ## Response
//! ```json
//! {
//!   "field_names": ["driver_stats:rating", "txn_stats:count_1h"],
//!   "field_statuses": [["PRESENT", "NOT_FOUND"]],
//!   "field_values": [[{"float_val": 4.5}, null]]
//! }
//! ```
//!
//! Per-slot failures are statuses; only unknown references, malformed
//! requests and resolution timeouts fail the call.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use featureloom_core::{OnlineFeaturesRequest, OnlineFeaturesResponse, DEFAULT_PROJECT};
use std::time::Instant;
use tracing::instrument;

use crate::{error::Result, metrics, state::AppState};

#[instrument(
    skip_all,
    fields(
        project = tracing::field::Empty,
        features = tracing::field::Empty,
        rows = tracing::field::Empty
    )
)]
pub async fn get_online_features(
    State(state): State<AppState>,
    payload: std::result::Result<Json<OnlineFeaturesRequest>, JsonRejection>,
) -> Result<Json<OnlineFeaturesResponse>> {
    let Json(request) = payload?;
    let start = Instant::now();

    let project = if request.project.is_empty() {
        DEFAULT_PROJECT
    } else {
        request.project.as_str()
    };
    let span = tracing::Span::current();
    span.record("project", project);
    span.record("features", request.features.len());
    span.record("rows", request.entity_rows.len());

    // The engine consumes the request
    let rows = request.entity_rows.len();
    let references = request.features.clone();

    match state.engine().get_online_features(request).await {
        Ok(response) => {
            let elapsed = start.elapsed();
            metrics::record_online_request(rows, "OK", elapsed.as_secs_f64());
            metrics::record_slot_statuses(&references, &response);
            tracing::debug!(latency_ms = elapsed.as_millis() as u64, "Online features served");
            Ok(Json(response))
        }
        Err(e) => {
            metrics::record_online_request(rows, e.code(), start.elapsed().as_secs_f64());
            Err(e.into())
        }
    }
}
