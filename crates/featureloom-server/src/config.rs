//! Configuration management
//!
//! Configuration comes from, in increasing priority:
//! - Built-in defaults
//! - A YAML file (`featureloom.yaml`)
//! - Environment variables (`FEATURELOOM_*`)
//! - Command-line arguments (handled in main.rs)
//!
//! ## Example Configuration File
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 6566
//!
//! security:
//!   mode: secure
//!   tokens:
//!     - token: "s3cr3t"
//!       subject: "materializer"
//!
//! registry:
//!   backend: sqlite
//!   path: "./featureloom_registry.db"
//!
//! online_store:
//!   type: redis
//!   url: "redis://localhost:6379"
//!
//! serving:
//!   lookup_timeout_ms: 500
//! ```

use featureloom_core::retry::RetryPolicy;
use featureloom_registry::RegistryConfig;
use featureloom_serving::ServingConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::auth::SecurityMode;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub online_store: OnlineStoreSection,
    #[serde(default)]
    pub serving: ServingSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request bound applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub mode: SecurityMode,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// A bearer token and the caller identity it authenticates as
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TokenConfig {
    pub token: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrySection {
    #[serde(default)]
    pub backend: RegistryBackend,
    #[serde(default = "default_registry_path")]
    pub path: String,
    #[serde(default = "default_registry_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStoreType {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OnlineStoreSection {
    #[serde(default, rename = "type")]
    pub store_type: OnlineStoreType,
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServingSection {
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_resolve_timeout_ms")]
    pub registry_timeout_ms: u64,
    #[serde(default = "default_lookup_max_retries")]
    pub lookup_max_retries: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6566
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_subject() -> String {
    "client".to_string()
}

fn default_registry_path() -> String {
    "./featureloom_registry.db".to_string()
}

fn default_registry_timeout_ms() -> u64 {
    5_000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    500
}

fn default_resolve_timeout_ms() -> u64 {
    2_000
}

fn default_lookup_max_retries() -> usize {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::default(),
            path: default_registry_path(),
            timeout_ms: default_registry_timeout_ms(),
        }
    }
}

impl Default for OnlineStoreSection {
    fn default() -> Self {
        Self {
            store_type: OnlineStoreType::default(),
            url: default_redis_url(),
        }
    }
}

impl Default for ServingSection {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            registry_timeout_ms: default_resolve_timeout_ms(),
            lookup_max_retries: default_lookup_max_retries(),
        }
    }
}

impl RegistrySection {
    pub fn registry_config(&self) -> RegistryConfig {
        match self.backend {
            RegistryBackend::Memory => RegistryConfig::InMemory,
            RegistryBackend::Sqlite => RegistryConfig::sqlite(&self.path),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServingSection {
    pub fn serving_config(&self) -> ServingConfig {
        ServingConfig {
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            registry_timeout: Duration::from_millis(self.registry_timeout_ms),
            lookup_retry: RetryPolicy::default().with_max_retries(self.lookup_max_retries),
        }
    }
}

impl Config {
    /// Apply `FEATURELOOM_*` overrides read through `lookup`
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FEATURELOOM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FEATURELOOM_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid FEATURELOOM_PORT"),
            }
        }
        if let Some(mode) = lookup("FEATURELOOM_SECURITY_MODE") {
            match mode.parse() {
                Ok(mode) => self.security.mode = mode,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid FEATURELOOM_SECURITY_MODE"),
            }
        }
        if let Some(tokens) = lookup("FEATURELOOM_TOKENS") {
            self.security.tokens = parse_tokens(&tokens);
        }
        if let Some(path) = lookup("FEATURELOOM_REGISTRY_PATH") {
            self.registry.backend = RegistryBackend::Sqlite;
            self.registry.path = path;
        }
        if let Some(url) = lookup("FEATURELOOM_REDIS_URL") {
            self.online_store.store_type = OnlineStoreType::Redis;
            self.online_store.url = url;
        }
    }
}

/// Parse `subject:token,token2,...`; a token without a subject gets the default one
pub fn parse_tokens(raw: &str) -> Vec<TokenConfig> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((subject, token)) if !subject.is_empty() && !token.is_empty() => TokenConfig {
                token: token.to_string(),
                subject: subject.to_string(),
            },
            _ => TokenConfig {
                token: entry.to_string(),
                subject: default_subject(),
            },
        })
        .collect()
}

/// Load configuration from a YAML file, falling back to defaults when the
/// file does not exist
pub fn load(path: &str) -> anyhow::Result<Config> {
    if !Path::new(path).exists() {
        tracing::warn!("Configuration file '{}' not found, using defaults", path);
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;

    tracing::info!("Loaded configuration from {}", path);
    Ok(config)
}
