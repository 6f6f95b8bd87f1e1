//! # FeatureLoom Server
//!
//! HTTP server for the feature registry and online serving.
//!
//! ## Startup Flow
//!
//! 1. Initialize tracing/logging
//! 2. Parse command-line arguments
//! 3. Load configuration (file, then `FEATURELOOM_*`, then flags)
//! 4. Open the registry and the online store
//! 5. Serve until SIGINT/SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! featureloom serve
//! featureloom serve --config featureloom.yaml --port 8080
//! LOG_FORMAT=json RUST_LOG=info,featureloom=debug featureloom serve
//! ```

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::{Parser, Subcommand};
use featureloom_core::OnlineStore;
use featureloom_online::{InMemoryOnlineStore, RedisConfig, RedisOnlineStore};
use featureloom_registry::FeatureRegistry;
use featureloom_server::{
    auth::{AuthConfig, SecurityMode},
    config::{self, Config, OnlineStoreType},
    router, shutdown,
    state::AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "featureloom")]
#[command(about = "Feature registry and freshness-aware online serving", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "featureloom.yaml")]
        config: String,

        /// Port to listen on (overrides config and environment)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config and environment)
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG sets the level, LOG_FORMAT picks json (production) or pretty
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => serve(config, host, port).await,
    }
}

async fn serve(config_path: String, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    info!(config = %config_path, "Starting FeatureLoom server");

    let mut config = config::load(&config_path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let auth = AuthConfig::new(config.security.mode, config.security.tokens.clone());
    match auth.mode() {
        SecurityMode::Secure if auth.token_count() == 0 => {
            warn!("Secure mode with no tokens configured: every API call will be rejected")
        }
        SecurityMode::Secure => info!(tokens = auth.token_count(), "Channel security: secure"),
        SecurityMode::Insecure => {
            info!("Channel security: insecure (set FEATURELOOM_SECURITY_MODE=secure to require tokens)")
        }
    }

    let registry = FeatureRegistry::new(config.registry.registry_config())
        .await
        .context("Failed to open feature registry")?
        .with_timeout(config.registry.timeout());
    let store = open_online_store(&config).await?;
    info!(
        registry = registry.backend_name(),
        online_store = store.store_type(),
        "Backends ready"
    );

    let state = AppState::new(registry, store, config.serving.serving_config(), auth);
    let app = router(state)
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn open_online_store(config: &Config) -> anyhow::Result<Arc<dyn OnlineStore>> {
    let store: Arc<dyn OnlineStore> = match config.online_store.store_type {
        OnlineStoreType::Memory => {
            warn!("Using in-memory online store; values are lost on restart");
            Arc::new(InMemoryOnlineStore::new())
        }
        OnlineStoreType::Redis => Arc::new(
            RedisOnlineStore::new(RedisConfig::new(config.online_store.url.clone()))
                .await
                .context("Failed to connect to Redis online store")?,
        ),
    };
    Ok(store)
}
