//! Prometheus metrics for the FeatureLoom server
//!
//! Tracks:
//! - Registry operations by outcome code
//! - Online request latency and row counts
//! - Serving slot statuses per feature table

use featureloom_core::{FeatureReference, FieldStatus, OnlineFeaturesResponse};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Registry operations
    pub static ref REGISTRY_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "featureloom_registry_operations_total",
        "Total registry operations",
        &["operation", "status"]
    )
    .unwrap();

    /// Online serving latency
    pub static ref ONLINE_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "featureloom_online_request_duration_seconds",
        "GetOnlineFeatures latency in seconds",
        &["status"],
        vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap();

    /// Entity rows per online request. Labelled by outcome code only, since
    /// request fields are client-controlled.
    pub static ref ONLINE_REQUEST_ROWS: HistogramVec = register_histogram_vec!(
        "featureloom_online_request_rows",
        "Entity rows per GetOnlineFeatures request",
        &["status"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    )
    .unwrap();

    /// Response slots by status
    pub static ref SERVING_SLOTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "featureloom_serving_slots_total",
        "Online response slots by feature table and status",
        &["feature_table", "status"]
    )
    .unwrap();
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Count one registry call; `status` is `OK` or the error code
pub fn record_registry_operation(operation: &str, status: &str) {
    REGISTRY_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record latency and size of one online request; `status` is `OK` or the
/// error code
pub fn record_online_request(rows: usize, status: &str, duration_seconds: f64) {
    ONLINE_REQUEST_DURATION
        .with_label_values(&[status])
        .observe(duration_seconds);
    ONLINE_REQUEST_ROWS
        .with_label_values(&[status])
        .observe(rows as f64);
}

/// Count every slot of a served response by table and status
pub fn record_slot_statuses(references: &[FeatureReference], response: &OnlineFeaturesResponse) {
    let mut counts: Vec<[u64; 5]> = vec![[0; 5]; references.len()];
    for row in &response.field_statuses {
        for (j, status) in row.iter().enumerate() {
            if let Some(slot) = counts.get_mut(j) {
                slot[status_index(*status)] += 1;
            }
        }
    }

    for (reference, per_status) in references.iter().zip(counts) {
        for (status, count) in STATUSES.iter().zip(per_status) {
            if count > 0 {
                SERVING_SLOTS_TOTAL
                    .with_label_values(&[reference.feature_table.as_str(), status.as_str()])
                    .inc_by(count);
            }
        }
    }
}

const STATUSES: [FieldStatus; 5] = [
    FieldStatus::Present,
    FieldStatus::NotFound,
    FieldStatus::Outdated,
    FieldStatus::EntityNotFound,
    FieldStatus::Error,
];

fn status_index(status: FieldStatus) -> usize {
    match status {
        FieldStatus::Present => 0,
        FieldStatus::NotFound => 1,
        FieldStatus::Outdated => 2,
        FieldStatus::EntityNotFound => 3,
        FieldStatus::Error => 4,
    }
}
