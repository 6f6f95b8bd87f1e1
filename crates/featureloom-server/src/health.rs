//! Health checks
//!
//! - `/health` - liveness (fast, always succeeds if the server is up)
//! - `/health/ready` - readiness (registry and online store reachable)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use featureloom_core::Result as CoreResult;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::state::AppState;

/// Above this a reachable component is reported as degraded
const DEGRADED_LATENCY: Duration = Duration::from_secs(1);

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub registry: ComponentHealth,
    pub online_store: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentHealth {
    fn from_probe(backend: &'static str, result: CoreResult<()>, latency: Duration) -> Self {
        let latency_ms = Some(latency.as_millis() as u64);
        match result {
            Ok(()) if latency > DEGRADED_LATENCY => Self {
                status: ComponentStatus::Degraded,
                backend,
                latency_ms,
                message: Some("High latency".to_string()),
            },
            Ok(()) => Self {
                status: ComponentStatus::Healthy,
                backend,
                latency_ms,
                message: None,
            },
            Err(e) => Self {
                status: ComponentStatus::Unhealthy,
                backend,
                latency_ms,
                message: Some(e.to_string()),
            },
        }
    }

    /// Degraded still serves traffic
    fn is_ready(&self) -> bool {
        self.status != ComponentStatus::Unhealthy
    }
}

async fn probe<F>(backend: &'static str, check: F) -> ComponentHealth
where
    F: Future<Output = CoreResult<()>>,
{
    let start = Instant::now();
    let result = check.await;
    ComponentHealth::from_probe(backend, result, start.elapsed())
}

/// `GET /health`
pub async fn liveness(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /health/ready`
///
/// 200 when every component is reachable, 503 otherwise.
pub async fn readiness(State(state): State<AppState>) -> Response {
    let registry = state.registry();
    let store = state.online_store();
    let (registry_health, store_health) = tokio::join!(
        probe(registry.backend_name(), registry.health_check()),
        probe(store.store_type(), store.health_check()),
    );

    let ready = registry_health.is_ready() && store_health.is_ready();
    if !ready {
        tracing::warn!(
            registry = ?registry_health.status,
            online_store = ?store_health.status,
            "Readiness check failed"
        );
    }

    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        uptime_seconds: state.uptime(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            registry: registry_health,
            online_store: store_health,
        },
    };

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response)).into_response()
}
