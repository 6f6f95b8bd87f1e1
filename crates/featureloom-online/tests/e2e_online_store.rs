//! E2E tests for Online Store
//!
//! The in-memory tests always run. The Redis tests require Redis to be running:
//! `cargo test -p featureloom-online --test e2e_online_store -- --ignored`

use chrono::{Duration, Utc};
use featureloom_core::Value;
use featureloom_online::{EntityKey, InMemoryOnlineStore, OnlineRow, OnlineStore};
use std::sync::Arc;

// Helper to create test rows for driver ids 0..count
fn create_driver_rows(count: usize) -> Vec<OnlineRow> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            OnlineRow::new(EntityKey::new().with("driver_id", i as i64))
                .with_feature("rating", 4.0f32 + (i % 10) as f32 / 10.0, now)
                .with_feature("trips_today", i as i32, now)
                .with_feature("city", format!("city_{}", i % 5), now)
        })
        .collect()
}

/// Shared contract every backend must satisfy
async fn check_store_contract(store: &dyn OnlineStore, table: &str) {
    let rows = create_driver_rows(25);
    store.write("default", table, rows).await.unwrap();

    // Every written key reads back
    for i in [0i64, 7, 24] {
        let key = EntityKey::new().with("driver_id", i);
        let features = store.get("default", table, &key).await.unwrap().unwrap();
        assert_eq!(features["trips_today"].value, Value::Int32(i as i32));
        assert_eq!(features.len(), 3);
    }

    // Absent key and absent table
    let missing = EntityKey::new().with("driver_id", 999i64);
    assert!(store.get("default", table, &missing).await.unwrap().is_none());
    let present = EntityKey::new().with("driver_id", 1i64);
    assert!(store
        .get("default", "no_such_table", &present)
        .await
        .unwrap()
        .is_none());

    // Partial update keeps the other features
    let later = Utc::now() + Duration::seconds(5);
    store
        .write(
            "default",
            table,
            vec![OnlineRow::new(present.clone()).with_feature("trips_today", 100i32, later)],
        )
        .await
        .unwrap();
    let features = store.get("default", table, &present).await.unwrap().unwrap();
    assert_eq!(features["trips_today"].value, Value::Int32(100));
    assert!(features.contains_key("rating"));

    // Delete
    store.delete("default", table, &[present.clone()]).await.unwrap();
    assert!(store.get("default", table, &present).await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = InMemoryOnlineStore::new();
    check_store_contract(&store, "driver_stats").await;
    assert_eq!(store.store_type(), "memory");
}

#[tokio::test]
async fn test_memory_store_concurrent_writers_keep_newest() {
    // Given: Writers racing on one key with different timestamps
    let store = Arc::new(InMemoryOnlineStore::new());
    let key = EntityKey::new().with("driver_id", 1i64);
    let base = Utc::now();

    let mut handles = Vec::new();
    for i in 0..16i64 {
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store
                .write(
                    "default",
                    "driver_stats",
                    vec![OnlineRow::new(key).with_feature(
                        "trips_today",
                        i as i32,
                        base + Duration::seconds(i),
                    )],
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Then: The newest event wins regardless of arrival order
    let features = store
        .get("default", "driver_stats", &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(features["trips_today"].value, Value::Int32(15));
}

#[cfg(feature = "redis")]
mod redis_tests {
    use super::*;
    use featureloom_online::{RedisConfig, RedisOnlineStore};

    async fn get_redis_store() -> RedisOnlineStore {
        RedisOnlineStore::new(RedisConfig::new("redis://localhost:6379"))
            .await
            .expect("Redis connection required")
    }

    #[tokio::test]
    #[ignore = "Requires Redis to be running"]
    async fn test_redis_health_check() {
        let store = get_redis_store().await;
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    #[ignore = "Requires Redis to be running"]
    async fn test_redis_store_contract() {
        let store = get_redis_store().await;
        let table = format!("e2e_{}", Utc::now().timestamp_micros());
        check_store_contract(&store, &table).await;
    }

    #[tokio::test]
    #[ignore = "Requires Redis to be running"]
    async fn test_redis_older_write_ignored() {
        let store = get_redis_store().await;
        let table = format!("e2e_stale_{}", Utc::now().timestamp_micros());
        let key = EntityKey::new().with("driver_id", 1i64);
        let now = Utc::now();

        store
            .write(
                "default",
                &table,
                vec![OnlineRow::new(key.clone()).with_feature("rating", 4.5f32, now)],
            )
            .await
            .unwrap();
        store
            .write(
                "default",
                &table,
                vec![OnlineRow::new(key.clone()).with_feature(
                    "rating",
                    1.0f32,
                    now - Duration::hours(1),
                )],
            )
            .await
            .unwrap();

        let features = store.get("default", &table, &key).await.unwrap().unwrap();
        assert_eq!(features["rating"].value, Value::Float(4.5));

        store.delete("default", &table, &[key]).await.unwrap();
    }
}
