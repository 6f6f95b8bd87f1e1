//! Application state shared across all HTTP handlers
//!
//! Cloning is cheap: everything lives behind one `Arc`.

use featureloom_core::OnlineStore;
use featureloom_registry::FeatureRegistry;
use featureloom_serving::{ServingConfig, ServingEngine};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthConfig;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: FeatureRegistry,
    engine: ServingEngine,
    auth: Arc<AuthConfig>,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        registry: FeatureRegistry,
        store: Arc<dyn OnlineStore>,
        serving: ServingConfig,
        auth: AuthConfig,
    ) -> Self {
        let engine = ServingEngine::new(registry.clone(), store).with_config(serving);
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                engine,
                auth: Arc::new(auth),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.inner.registry
    }

    pub fn engine(&self) -> &ServingEngine {
        &self.inner.engine
    }

    pub fn online_store(&self) -> &Arc<dyn OnlineStore> {
        self.inner.engine.store()
    }

    pub fn auth(&self) -> Arc<AuthConfig> {
        Arc::clone(&self.inner.auth)
    }

    /// Server uptime in seconds
    pub fn uptime(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
