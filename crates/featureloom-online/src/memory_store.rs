//! In-memory online store
//!
//! A `HashMap` from online key to the features of that key, behind a tokio
//! `RwLock`. Used by tests, local development and single-process deployments
//! where the materialization job writes through the same process.

use async_trait::async_trait;
use featureloom_core::{
    build_online_key, merge_features, EntityKey, OnlineRow, OnlineStore, Result, StoredFeatures,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct InMemoryOnlineStore {
    data: RwLock<HashMap<String, StoredFeatures>>,
}

impl InMemoryOnlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entity keys currently stored, across all tables
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl OnlineStore for InMemoryOnlineStore {
    async fn get(
        &self,
        project: &str,
        feature_table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredFeatures>> {
        let online_key = build_online_key(project, feature_table, key)?;
        Ok(self.data.read().await.get(&online_key).cloned())
    }

    async fn write(&self, project: &str, feature_table: &str, rows: Vec<OnlineRow>) -> Result<()> {
        let rows_written = rows.len();
        // Encode before taking the lock
        let mut encoded = Vec::with_capacity(rows.len());
        for row in rows {
            encoded.push((
                build_online_key(project, feature_table, &row.entity_key)?,
                row.features,
            ));
        }

        let mut data = self.data.write().await;
        for (online_key, features) in encoded {
            merge_features(data.entry(online_key).or_default(), features);
        }

        debug!(project, feature_table, rows_written, "In-memory write complete");
        Ok(())
    }

    async fn delete(&self, project: &str, feature_table: &str, keys: &[EntityKey]) -> Result<()> {
        let mut encoded = Vec::with_capacity(keys.len());
        for key in keys {
            encoded.push(build_online_key(project, feature_table, key)?);
        }

        let mut data = self.data.write().await;
        for online_key in encoded {
            data.remove(&online_key);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
