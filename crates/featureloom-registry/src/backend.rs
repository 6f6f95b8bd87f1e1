//! Spec store trait and backend configuration
//!
//! The spec store persists registry objects and enforces optimistic
//! concurrency: every write names the version it was computed from and is
//! rejected with `Error::VersionConflict` if the stored version moved.
//! Supported backends:
//! - **In-memory** - tokio `RwLock`, for tests and ephemeral deployments
//! - **SQLite with WAL** - embedded, survives restarts

use async_trait::async_trait;
use featureloom_core::{Entity, FeatureTable, Project, Result};

/// Storage operations the registry service is built on
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Initialize schema and make sure the `default` project exists
    async fn init_schema(&self) -> Result<()>;

    async fn get_project(&self, name: &str) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Insert a project; returns false if the name is already taken
    async fn create_project(&self, project: &Project) -> Result<bool>;

    /// Mark a project archived; returns false if it does not exist
    async fn archive_project(&self, name: &str) -> Result<bool>;

    async fn get_entity(&self, project: &str, name: &str) -> Result<Option<Entity>>;

    /// All entities of a project, ordered by name
    async fn list_entities(&self, project: &str) -> Result<Vec<Entity>>;

    /// Compare-and-swap write
    ///
    /// `expected_version = None` means the entity must not exist yet.
    async fn put_entity(&self, entity: &Entity, expected_version: Option<u64>) -> Result<()>;

    async fn get_feature_table(&self, project: &str, name: &str) -> Result<Option<FeatureTable>>;

    /// All feature tables of a project, ordered by name
    async fn list_feature_tables(&self, project: &str) -> Result<Vec<FeatureTable>>;

    /// Compare-and-swap write, same contract as [`SpecStore::put_entity`]
    async fn put_feature_table(
        &self,
        table: &FeatureTable,
        expected_version: Option<u64>,
    ) -> Result<()>;

    /// Compare-and-swap delete
    async fn delete_feature_table(
        &self,
        project: &str,
        name: &str,
        expected_version: u64,
    ) -> Result<()>;

    /// Returns Ok(()) if the store can serve requests
    async fn health_check(&self) -> Result<()>;

    /// Backend name for logging/metrics
    fn backend_name(&self) -> &'static str;
}

/// Configuration for the spec store backend
#[derive(Debug, Clone, Default)]
pub enum RegistryConfig {
    /// Process-local, lost on restart
    #[default]
    InMemory,

    /// SQLite with WAL mode
    SQLite {
        /// Path to SQLite database file
        path: String,
    },
}

impl RegistryConfig {
    /// Create SQLite configuration
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::SQLite { path: path.into() }
    }
}

/// Storage key used in conflict errors and log lines
pub(crate) fn object_key(project: &str, name: &str) -> String {
    format!("{}/{}", project, name)
}
