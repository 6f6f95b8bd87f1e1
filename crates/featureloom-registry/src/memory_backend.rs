//! In-memory spec store
//!
//! All state lives behind one tokio `RwLock`; a compare-and-swap holds the
//! write lock for the check and the write, so it is atomic per object.

use crate::backend::{object_key, SpecStore};
use async_trait::async_trait;
use featureloom_core::{Entity, Error, FeatureTable, Project, Result, DEFAULT_PROJECT};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

type ObjectId = (String, String);

#[derive(Default)]
struct Inner {
    projects: BTreeMap<String, Project>,
    entities: BTreeMap<ObjectId, Entity>,
    tables: BTreeMap<ObjectId, FeatureTable>,
}

#[derive(Default)]
pub struct InMemorySpecStore {
    inner: RwLock<Inner>,
}

impl InMemorySpecStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn id(project: &str, name: &str) -> ObjectId {
    (project.to_string(), name.to_string())
}

/// Shared CAS rule: the stored version must equal the expected one
fn check_version(key: ObjectId, expected: Option<u64>, actual: Option<u64>) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::VersionConflict {
            key: object_key(&key.0, &key.1),
            expected,
            actual,
        })
    }
}

/// Values of a `BTreeMap<(project, name), _>` that belong to one project, in name order
fn in_project<'a, T: Clone + 'a>(
    map: &'a BTreeMap<ObjectId, T>,
    project: &'a str,
) -> impl Iterator<Item = T> + 'a {
    map.range(id(project, "")..)
        .take_while(move |((p, _), _)| p == project)
        .map(|(_, v)| v.clone())
}

#[async_trait]
impl SpecStore for InMemorySpecStore {
    async fn init_schema(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .projects
            .entry(DEFAULT_PROJECT.to_string())
            .or_insert_with(|| Project::new(DEFAULT_PROJECT));
        Ok(())
    }

    async fn get_project(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.inner.read().await.projects.get(name).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.inner.read().await.projects.values().cloned().collect())
    }

    async fn create_project(&self, project: &Project) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.projects.contains_key(&project.name) {
            return Ok(false);
        }
        inner
            .projects
            .insert(project.name.clone(), project.clone());
        debug!(project = %project.name, "Created project");
        Ok(true)
    }

    async fn archive_project(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.projects.get_mut(name) {
            Some(project) => {
                project.archived = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_entity(&self, project: &str, name: &str) -> Result<Option<Entity>> {
        Ok(self.inner.read().await.entities.get(&id(project, name)).cloned())
    }

    async fn list_entities(&self, project: &str) -> Result<Vec<Entity>> {
        let inner = self.inner.read().await;
        Ok(in_project(&inner.entities, project).collect())
    }

    async fn put_entity(&self, entity: &Entity, expected_version: Option<u64>) -> Result<()> {
        let key = id(&entity.project, &entity.spec.name);
        let mut inner = self.inner.write().await;
        let actual = inner.entities.get(&key).map(|e| e.meta.version);
        check_version(key.clone(), expected_version, actual)?;
        inner.entities.insert(key, entity.clone());
        Ok(())
    }

    async fn get_feature_table(&self, project: &str, name: &str) -> Result<Option<FeatureTable>> {
        Ok(self.inner.read().await.tables.get(&id(project, name)).cloned())
    }

    async fn list_feature_tables(&self, project: &str) -> Result<Vec<FeatureTable>> {
        let inner = self.inner.read().await;
        Ok(in_project(&inner.tables, project).collect())
    }

    async fn put_feature_table(
        &self,
        table: &FeatureTable,
        expected_version: Option<u64>,
    ) -> Result<()> {
        let key = id(&table.project, &table.spec.name);
        let mut inner = self.inner.write().await;
        let actual = inner.tables.get(&key).map(|t| t.meta.version);
        check_version(key.clone(), expected_version, actual)?;
        inner.tables.insert(key, table.clone());
        Ok(())
    }

    async fn delete_feature_table(
        &self,
        project: &str,
        name: &str,
        expected_version: u64,
    ) -> Result<()> {
        let key = id(project, name);
        let mut inner = self.inner.write().await;
        let actual = inner.tables.get(&key).map(|t| t.meta.version);
        check_version(key.clone(), Some(expected_version), actual)?;
        inner.tables.remove(&key);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use featureloom_core::{EntitySpec, ObjectMeta, ValueType};

    fn entity(project: &str, name: &str, version: u64) -> Entity {
        let mut meta = ObjectMeta::first(Utc::now());
        meta.version = version;
        Entity {
            project: project.to_string(),
            spec: EntitySpec::new(name, ValueType::Int64),
            meta,
        }
    }

    #[tokio::test]
    async fn test_default_project_exists_after_init() {
        let store = InMemorySpecStore::new();
        store.init_schema().await.unwrap();
        let project = store.get_project(DEFAULT_PROJECT).await.unwrap().unwrap();
        assert!(!project.archived);
    }

    #[tokio::test]
    async fn test_put_entity_cas() {
        let store = InMemorySpecStore::new();

        store.put_entity(&entity("default", "driver_id", 1), None).await.unwrap();

        // Creating twice conflicts
        let err = store
            .put_entity(&entity("default", "driver_id", 1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionConflict { expected: None, actual: Some(1), .. }
        ));

        // Stale update conflicts, fresh update succeeds
        assert!(store
            .put_entity(&entity("default", "driver_id", 2), Some(7))
            .await
            .is_err());
        store
            .put_entity(&entity("default", "driver_id", 2), Some(1))
            .await
            .unwrap();
        let stored = store.get_entity("default", "driver_id").await.unwrap().unwrap();
        assert_eq!(stored.meta.version, 2);
    }

    #[tokio::test]
    async fn test_list_is_project_scoped_and_ordered() {
        let store = InMemorySpecStore::new();
        for (project, name) in [("a", "zeta"), ("a", "alpha"), ("ab", "other"), ("b", "beta")] {
            store.put_entity(&entity(project, name, 1), None).await.unwrap();
        }

        let names: Vec<_> = store
            .list_entities("a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.spec.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
