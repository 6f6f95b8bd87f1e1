//! Online store contract for low-latency feature serving
//!
//! The online store holds only the *latest* value of every feature for every
//! entity key. A separate materialization job writes into it; the serving
//! engine only reads.
//!
//! ## Key model
//!
//! ```text
//! (project, feature_table, EntityKey)  ──►  { feature_name -> (value, event_timestamp) }
//! ```
//!
//! An [`EntityKey`] is the ordered list of `(entity_name, value)` pairs of one
//! row, in the order the feature table declares its entities. Its canonical
//! encoding is the JSON of that list, so two keys are equal exactly when their
//! encodings are.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featureloom_core::{EntityKey, OnlineStore};
//!
//! async fn lookup(store: &dyn OnlineStore) {
//!     let key = EntityKey::new().with("driver_id", 1001i64);
//!     let features = store.get("default", "driver_stats", &key).await?;
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Value;
use crate::Result;

/// Ordered entity values of one row for one feature table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityKey {
    parts: Vec<(String, Value)>,
}

impl EntityKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next entity of the join key
    pub fn with(mut self, entity: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parts.push((entity.into(), value.into()));
        self
    }

    pub fn push(&mut self, entity: impl Into<String>, value: Value) {
        self.parts.push((entity.into(), value));
    }

    pub fn parts(&self) -> &[(String, Value)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Canonical string form, stable for equal keys
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.parts)?)
    }
}

/// Latest stored value of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeatureValue {
    pub value: Value,
    pub event_timestamp: DateTime<Utc>,
}

impl StoredFeatureValue {
    pub fn new(value: impl Into<Value>, event_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            event_timestamp,
        }
    }
}

/// Feature name -> latest value, for one entity key of one table
pub type StoredFeatures = HashMap<String, StoredFeatureValue>;

/// One entity key's worth of features, as written by materialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRow {
    pub entity_key: EntityKey,
    pub features: StoredFeatures,
}

impl OnlineRow {
    pub fn new(entity_key: EntityKey) -> Self {
        Self {
            entity_key,
            features: StoredFeatures::new(),
        }
    }

    pub fn with_feature(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        event_timestamp: DateTime<Utc>,
    ) -> Self {
        self.features
            .insert(name.into(), StoredFeatureValue::new(value, event_timestamp));
        self
    }
}

/// Merge `incoming` into `existing`, keeping the newer value of every feature.
///
/// Ties go to the incoming value so that re-materializing the same timestamp
/// can correct a bad write.
pub fn merge_features(existing: &mut StoredFeatures, incoming: StoredFeatures) {
    for (name, value) in incoming {
        match existing.get(&name) {
            Some(current) if current.event_timestamp > value.event_timestamp => {}
            _ => {
                existing.insert(name, value);
            }
        }
    }
}

/// Trait for online feature stores (in-memory, Redis, ...)
///
/// ## Implementation Requirements
///
/// - `get` returns `Ok(None)` only when the key is confirmed absent. Any
///   backend failure must surface as `Err(Error::Storage)`, never as `None`.
/// - `write` merges per feature with [`merge_features`] semantics.
/// - Thread-safe (Send + Sync); the serving engine calls `get` from many
///   tasks at once.
#[async_trait]
pub trait OnlineStore: Send + Sync {
    /// Latest features stored for one entity key
    async fn get(
        &self,
        project: &str,
        feature_table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredFeatures>>;

    /// Upsert rows (used by materialization and tests)
    async fn write(&self, project: &str, feature_table: &str, rows: Vec<OnlineRow>) -> Result<()>;

    /// Remove everything stored for the given keys
    async fn delete(&self, project: &str, feature_table: &str, keys: &[EntityKey]) -> Result<()>;

    /// Returns Ok(()) if the store is ready to serve requests
    async fn health_check(&self) -> Result<()>;

    /// Name of this online store type (for logging/metrics)
    fn store_type(&self) -> &'static str;
}

/// Build the storage key of one entity key
///
/// Format: `{project}:{feature_table}:{encoded_entity_key}`
pub fn build_online_key(project: &str, feature_table: &str, key: &EntityKey) -> Result<String> {
    Ok(format!("{}:{}:{}", project, feature_table, key.encode()?))
}
