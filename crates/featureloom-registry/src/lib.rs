//! Feature Registry for FeatureLoom
//!
//! Authoritative, versioned catalog of projects, entities and feature tables.
//! Backed by a pluggable [`SpecStore`]:
//! - **In-memory** - tests and ephemeral deployments
//! - **SQLite with WAL** - embedded, survives restarts
//!
//! Every mutation validates first and then performs exactly one
//! compare-and-swap write, so a failed apply leaves no trace. Lost races are
//! re-read and retried with exponential backoff; every store call is bounded by
//! the registry timeout.
//!
//! # Examples
//!
//! ```rust,ignore
//! use featureloom_core::{EntitySpec, ValueType, DEFAULT_PROJECT};
//! use featureloom_registry::{FeatureRegistry, RegistryConfig};
//!
//! let registry = FeatureRegistry::new(RegistryConfig::sqlite("./registry.db")).await?;
//! let entity = registry
//!     .apply_entity(DEFAULT_PROJECT, EntitySpec::new("driver_id", ValueType::Int64))
//!     .await?;
//! assert_eq!(entity.meta.version, 1);
//! ```

use chrono::Utc;
use featureloom_core::retry::{retry_async, RetryError, RetryPolicy};
use featureloom_core::validation::{
    check_entity_update, check_feature_table_update, validate_entity_spec,
    validate_feature_table_spec, validate_name,
};
use featureloom_core::{
    labels_match, Entity, EntitySpec, Error, FeatureTable, FeatureTableSpec, Labels, ObjectKind,
    ObjectMeta, Project, Result, DEFAULT_PROJECT,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod backend;
pub use backend::{RegistryConfig, SpecStore};

mod memory_backend;
mod schema;
mod sqlite_backend;

pub use memory_backend::InMemorySpecStore;
pub use sqlite_backend::SqliteSpecStore;

/// Default bound on a single spec store call
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Feature Registry with pluggable spec store
#[derive(Clone)]
pub struct FeatureRegistry {
    store: Arc<dyn SpecStore>,
    timeout: Duration,
    retry: RetryPolicy,
}

/// What an apply did, for logging
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl FeatureRegistry {
    /// Create a registry with the given backend configuration and initialize it
    pub async fn new(config: RegistryConfig) -> Result<Self> {
        let store: Arc<dyn SpecStore> = match config {
            RegistryConfig::InMemory => Arc::new(InMemorySpecStore::new()),
            RegistryConfig::SQLite { path } => Arc::new(SqliteSpecStore::new(&path)?),
        };
        Self::with_store(store).await
    }

    /// Create in-memory registry (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::new(RegistryConfig::InMemory).await
    }

    /// Wrap an existing store and initialize its schema
    pub async fn with_store(store: Arc<dyn SpecStore>) -> Result<Self> {
        store.init_schema().await?;
        info!(backend = store.backend_name(), "Feature registry ready");
        Ok(Self {
            store,
            timeout: DEFAULT_REGISTRY_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    /// Bound every spec store call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for lost compare-and-swap races and transient failures
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.bounded("health_check", self.store.health_check()).await
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "registry {} exceeded {:?}",
                op, self.timeout
            ))),
        }
    }

    /// Run `op` under the retry policy; lost races that never resolve become `Internal`
    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_async(&self.retry, op)
            .await
            .map_err(|RetryError { error, attempts, .. }| match error {
                Error::VersionConflict { .. } => {
                    warn!(what, attempts, "Gave up after repeated version conflicts");
                    Error::internal(format!(
                        "{} kept conflicting with concurrent writers after {} attempts",
                        what, attempts
                    ))
                }
                other => other,
            })
    }

    /// The project must exist and accept writes
    async fn writable_project(&self, project: &str) -> Result<()> {
        let found = self.require_project(project).await?;
        if found.archived {
            return Err(Error::invalid_argument(format!(
                "Project '{}' is archived",
                project
            )));
        }
        Ok(())
    }

    async fn require_project(&self, project: &str) -> Result<Project> {
        validate_name("Project", project)?;
        self.bounded("get_project", self.store.get_project(project))
            .await?
            .ok_or_else(|| Error::not_found(ObjectKind::Project, project, project))
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    pub async fn create_project(&self, name: &str) -> Result<Project> {
        validate_name("Project", name)?;
        let project = Project::new(name);
        let created = self
            .bounded("create_project", self.store.create_project(&project))
            .await?;
        if !created {
            return Err(Error::invalid_argument(format!(
                "Project '{}' already exists",
                name
            )));
        }
        info!(project = name, "Created project");
        Ok(project)
    }

    /// Active (non-archived) projects, ordered by name
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects = self
            .bounded("list_projects", self.store.list_projects())
            .await?;
        Ok(projects.into_iter().filter(|p| !p.archived).collect())
    }

    pub async fn archive_project(&self, name: &str) -> Result<()> {
        validate_name("Project", name)?;
        if name == DEFAULT_PROJECT {
            return Err(Error::invalid_argument(
                "The default project cannot be archived",
            ));
        }
        let found = self
            .bounded("archive_project", self.store.archive_project(name))
            .await?;
        if !found {
            return Err(Error::not_found(ObjectKind::Project, name, name));
        }
        info!(project = name, "Archived project");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    /// Create or update an entity
    ///
    /// Applying an identical spec returns the stored entity unchanged. Only
    /// description and labels may change; a value type change fails with
    /// `IncompatibleSchema`.
    pub async fn apply_entity(&self, project: &str, spec: EntitySpec) -> Result<Entity> {
        validate_entity_spec(&spec)?;
        self.writable_project(project).await?;

        let what = format!("apply_entity {}/{}", project, spec.name);
        let (entity, outcome) = self
            .with_retries(&what, || async {
                let current = self
                    .bounded("get_entity", self.store.get_entity(project, &spec.name))
                    .await?;
                let now = Utc::now();
                match current {
                    None => {
                        let entity = Entity {
                            project: project.to_string(),
                            spec: spec.clone(),
                            meta: ObjectMeta::first(now),
                        };
                        self.bounded("put_entity", self.store.put_entity(&entity, None))
                            .await?;
                        Ok((entity, Outcome::Created))
                    }
                    Some(current) if current.spec == spec => Ok((current, Outcome::Unchanged)),
                    Some(current) => {
                        check_entity_update(&current.spec, &spec)?;
                        let entity = Entity {
                            project: project.to_string(),
                            spec: spec.clone(),
                            meta: current.meta.bumped(now),
                        };
                        self.bounded(
                            "put_entity",
                            self.store.put_entity(&entity, Some(current.meta.version)),
                        )
                        .await?;
                        Ok((entity, Outcome::Updated))
                    }
                }
            })
            .await?;

        log_outcome("entity", project, &entity.spec.name, entity.meta.version, outcome);
        Ok(entity)
    }

    pub async fn get_entity(&self, project: &str, name: &str) -> Result<Entity> {
        self.bounded("get_entity", self.store.get_entity(project, name))
            .await?
            .ok_or_else(|| Error::not_found(ObjectKind::Entity, project, name))
    }

    /// Entities of a project whose labels contain every `filter` label
    pub async fn list_entities(&self, project: &str, filter: &Labels) -> Result<Vec<Entity>> {
        self.require_project(project).await?;
        let entities = self
            .bounded("list_entities", self.store.list_entities(project))
            .await?;
        Ok(entities
            .into_iter()
            .filter(|e| labels_match(&e.spec.labels, filter))
            .collect())
    }

    // ---------------------------------------------------------------------
    // Feature tables
    // ---------------------------------------------------------------------

    /// Create or update a feature table
    ///
    /// Entities are immutable after creation and surviving features keep their
    /// value type. Features may be added or removed; labels, `max_age` and
    /// sources may change freely.
    pub async fn apply_feature_table(
        &self,
        project: &str,
        spec: FeatureTableSpec,
    ) -> Result<FeatureTable> {
        validate_feature_table_spec(&spec)?;
        self.writable_project(project).await?;

        // Entities are never deleted, so this check cannot go stale
        for entity in &spec.entities {
            let found = self
                .bounded("get_entity", self.store.get_entity(project, entity))
                .await?;
            if found.is_none() {
                return Err(Error::UnknownEntity {
                    project: project.to_string(),
                    table: spec.name.clone(),
                    entity: entity.clone(),
                });
            }
        }

        let what = format!("apply_feature_table {}/{}", project, spec.name);
        let (table, outcome) = self
            .with_retries(&what, || async {
                let current = self
                    .bounded(
                        "get_feature_table",
                        self.store.get_feature_table(project, &spec.name),
                    )
                    .await?;
                let now = Utc::now();
                match current {
                    None => {
                        let table = FeatureTable {
                            project: project.to_string(),
                            spec: spec.clone(),
                            meta: ObjectMeta::first(now),
                        };
                        self.bounded(
                            "put_feature_table",
                            self.store.put_feature_table(&table, None),
                        )
                        .await?;
                        Ok((table, Outcome::Created))
                    }
                    Some(current) if current.spec == spec => Ok((current, Outcome::Unchanged)),
                    Some(current) => {
                        check_feature_table_update(&current.spec, &spec)?;
                        let table = FeatureTable {
                            project: project.to_string(),
                            spec: spec.clone(),
                            meta: current.meta.bumped(now),
                        };
                        self.bounded(
                            "put_feature_table",
                            self.store
                                .put_feature_table(&table, Some(current.meta.version)),
                        )
                        .await?;
                        Ok((table, Outcome::Updated))
                    }
                }
            })
            .await?;

        log_outcome(
            "feature table",
            project,
            &table.spec.name,
            table.meta.version,
            outcome,
        );
        Ok(table)
    }

    pub async fn get_feature_table(&self, project: &str, name: &str) -> Result<FeatureTable> {
        self.bounded(
            "get_feature_table",
            self.store.get_feature_table(project, name),
        )
        .await?
        .ok_or_else(|| Error::not_found(ObjectKind::FeatureTable, project, name))
    }

    /// Feature tables of a project whose labels contain every `filter` label
    pub async fn list_feature_tables(
        &self,
        project: &str,
        filter: &Labels,
    ) -> Result<Vec<FeatureTable>> {
        self.require_project(project).await?;
        let tables = self
            .bounded(
                "list_feature_tables",
                self.store.list_feature_tables(project),
            )
            .await?;
        Ok(tables
            .into_iter()
            .filter(|t| labels_match(&t.spec.labels, filter))
            .collect())
    }

    /// Hard-delete a feature table; the entities it referenced stay
    pub async fn delete_feature_table(&self, project: &str, name: &str) -> Result<()> {
        self.writable_project(project).await?;

        let what = format!("delete_feature_table {}/{}", project, name);
        self.with_retries(&what, || async {
            let current = self.get_feature_table(project, name).await?;
            self.bounded(
                "delete_feature_table",
                self.store
                    .delete_feature_table(project, name, current.meta.version),
            )
            .await
        })
        .await?;

        info!(project, table = name, "Deleted feature table");
        Ok(())
    }
}

fn log_outcome(kind: &str, project: &str, name: &str, version: u64, outcome: Outcome) {
    match outcome {
        Outcome::Created => info!(project, name, version, "Created {}", kind),
        Outcome::Updated => info!(project, name, version, "Updated {}", kind),
        Outcome::Unchanged => debug!(project, name, version, "Applied identical {}", kind),
    }
}
