//! FeatureLoom Online Store - latest feature values for real-time serving
//!
//! This crate provides the [`OnlineStore`] backends the serving engine reads
//! from. A materialization job (outside this repository) writes the latest
//! value of every feature per entity key; the serving engine only reads.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   write(rows)   ┌────────────────────┐   get(key)   ┌────────────────┐
//! │  Materialization  │ ──────────────► │    Online Store    │ ◄─────────── │ Serving Engine │
//! │  (batch/stream)   │                 │  (memory / Redis)  │              │                │
//! └───────────────────┘                 └────────────────────┘              └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use featureloom_online::{InMemoryOnlineStore, OnlineStore, EntityKey};
//!
//! let store = InMemoryOnlineStore::new();
//! let key = EntityKey::new().with("driver_id", 1001i64);
//! let features = store.get("default", "driver_stats", &key).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `redis` (default): Enable Redis online store

// Re-export core types
pub use featureloom_core::{
    build_online_key, EntityKey, OnlineRow, OnlineStore, StoredFeatureValue, StoredFeatures,
};

pub mod memory_store;
pub use memory_store::InMemoryOnlineStore;

// Redis store (default feature)
#[cfg(feature = "redis")]
pub mod redis_store;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisOnlineStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_re_exports() {
        let key = EntityKey::new().with("user_id", "123");
        let online_key = build_online_key("default", "user_features", &key).unwrap();
        assert!(online_key.starts_with("default:user_features:"));
        assert!(online_key.contains("user_id"));
    }
}
