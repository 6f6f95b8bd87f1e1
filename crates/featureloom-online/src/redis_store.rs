//! Redis online store
//!
//! One Redis hash per entity key, one hash field per feature. Field values are
//! JSON documents carrying the typed value and its event timestamp.
//!
//! ## Write path
//!
//! Writes go through a small Lua script so that the "newer event timestamp
//! wins" merge happens inside Redis, atomically per entity key, even with
//! several materialization jobs writing at once. Rows are encoded in batches of
//! `write_batch_size` and sent one script call per entity key.
//!
//! ## Read path
//!
//! `HGETALL` on the entity key. An empty reply is the only thing reported as
//! absence; connection and protocol errors surface as `Error::Storage`.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featureloom_core::{
    build_online_key, EntityKey, Error, OnlineRow, OnlineStore, Result, StoredFeatureValue,
    StoredFeatures, Value,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-feature merge; ARGV is a flat list of (field, event_ts_micros, json) triples
const MERGE_SCRIPT: &str = r#"
local written = 0
for i = 1, #ARGV, 3 do
  local current = redis.call('HGET', KEYS[1], ARGV[i])
  if (not current) or cjson.decode(current)['event_ts_micros'] <= tonumber(ARGV[i + 1]) then
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 2])
    written = written + 1
  end
end
return written
"#;

/// Redis online store configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Rows encoded per write batch
    pub write_batch_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            write_batch_size: 1000,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Hash field payload
#[derive(Debug, Serialize, Deserialize)]
struct RedisFeature {
    value: Value,
    event_ts_micros: i64,
}

impl RedisFeature {
    fn encode(stored: &StoredFeatureValue) -> Result<String> {
        Ok(serde_json::to_string(&RedisFeature {
            value: stored.value.clone(),
            event_ts_micros: stored.event_timestamp.timestamp_micros(),
        })?)
    }

    fn decode(field: &str, data: &str) -> Result<StoredFeatureValue> {
        let feature: RedisFeature = serde_json::from_str(data)?;
        let event_timestamp =
            DateTime::<Utc>::from_timestamp_micros(feature.event_ts_micros).ok_or_else(|| {
                Error::Storage(anyhow!(
                    "Feature '{}' has an out-of-range event timestamp",
                    field
                ))
            })?;
        Ok(StoredFeatureValue {
            value: feature.value,
            event_timestamp,
        })
    }
}

fn redis_err(context: &str, e: redis::RedisError) -> Error {
    Error::Storage(anyhow!("Redis {} error: {}", context, e))
}

/// Redis online store
///
/// Uses ConnectionManager for multiplexed connections (one TCP connection,
/// many concurrent requests) and transparent reconnects.
pub struct RedisOnlineStore {
    conn: ConnectionManager,
    config: RedisConfig,
    merge: Script,
}

impl RedisOnlineStore {
    /// Connect to Redis
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone()).map_err(|e| redis_err("connection", e))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_err("connection manager", e))?;

        tracing::info!(url = %config.url, "Connected Redis online store");

        Ok(Self {
            conn,
            config,
            merge: Script::new(MERGE_SCRIPT),
        })
    }
}

#[async_trait]
impl OnlineStore for RedisOnlineStore {
    async fn get(
        &self,
        project: &str,
        feature_table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredFeatures>> {
        let online_key = build_online_key(project, feature_table, key)?;
        let mut conn = self.conn.clone();

        let fields: HashMap<String, String> = conn
            .hgetall(&online_key)
            .await
            .map_err(|e| redis_err("HGETALL", e))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let mut features = StoredFeatures::with_capacity(fields.len());
        for (name, data) in fields {
            let value = RedisFeature::decode(&name, &data)?;
            features.insert(name, value);
        }
        Ok(Some(features))
    }

    async fn write(&self, project: &str, feature_table: &str, rows: Vec<OnlineRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let batch_size = self.config.write_batch_size.max(1);

        for chunk in rows.chunks(batch_size) {
            // Encode the whole batch before sending any of it
            let mut invocations = Vec::with_capacity(chunk.len());
            for row in chunk {
                if row.features.is_empty() {
                    continue;
                }
                let mut invocation = self.merge.prepare_invoke();
                invocation.key(build_online_key(project, feature_table, &row.entity_key)?);
                for (name, stored) in &row.features {
                    invocation
                        .arg(name)
                        .arg(stored.event_timestamp.timestamp_micros())
                        .arg(RedisFeature::encode(stored)?);
                }
                invocations.push(invocation);
            }

            for invocation in &invocations {
                invocation
                    .invoke_async::<_, i64>(&mut conn)
                    .await
                    .map_err(|e| redis_err("merge script", e))?;
            }
        }

        tracing::debug!(
            project = project,
            feature_table = feature_table,
            rows_written = rows.len(),
            "Redis write complete"
        );

        Ok(())
    }

    async fn delete(&self, project: &str, feature_table: &str, keys: &[EntityKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut online_keys = Vec::with_capacity(keys.len());
        for key in keys {
            online_keys.push(build_online_key(project, feature_table, key)?);
        }

        conn.del::<_, ()>(&online_keys)
            .await
            .map_err(|e| redis_err("DEL", e))?;

        Ok(())
    }

    /// Health check using PING
    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("PING", e))?;

        if pong != "PONG" {
            return Err(Error::Storage(anyhow!(
                "Redis health check failed: expected PONG, got {}",
                pong
            )));
        }

        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
