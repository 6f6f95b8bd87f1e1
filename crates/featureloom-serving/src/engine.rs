//! `GetOnlineFeatures` execution
//!
//! Request flow:
//!
//! ```text
//! references ──resolve──► tables (entities, max_age, feature types)
//!      rows ──derive───► EntityKey per (row, table)
//!                          │ dedup
//!                          ▼
//!                  lookups (JoinSet, one task per distinct (table, key))
//!                          │ join
//!                          ▼
//!                 [row][reference] statuses + values
//! ```
//!
//! Only resolution can fail the whole request. Everything after it degrades
//! per slot.

use chrono::{DateTime, Utc};
use featureloom_core::retry::{retry_async, RetryPolicy};
use featureloom_core::{
    EntityKey, Error, FeatureReference, FeatureTable, FieldStatus, OnlineFeaturesRequest,
    OnlineFeaturesResponse, OnlineStore, Result, StoredFeatures, Value, ValueType,
    DEFAULT_PROJECT,
};
use featureloom_registry::FeatureRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Bounds and retry behaviour of the serving path
#[derive(Debug, Clone)]
pub struct ServingConfig {
    /// Bound on one online store lookup, retries included
    pub lookup_timeout: Duration,
    /// Bound on resolving all references of one request
    pub registry_timeout: Duration,
    /// Retries of a failing online store lookup
    pub lookup_retry: RetryPolicy,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(500),
            registry_timeout: Duration::from_secs(2),
            lookup_retry: RetryPolicy::default().with_max_retries(2),
        }
    }
}

/// Stateless read-path orchestrator
#[derive(Clone)]
pub struct ServingEngine {
    registry: FeatureRegistry,
    store: Arc<dyn OnlineStore>,
    config: ServingConfig,
}

/// A feature table touched by the request
struct ResolvedTable {
    project: String,
    table: FeatureTable,
    /// Declared type of each join-key entity, in declared order
    entity_types: Vec<ValueType>,
}

/// Per-(row, table) outcome of key derivation
#[derive(Clone, Copy)]
enum RowKey {
    MissingEntity,
    WrongEntityType,
    Lookup(usize),
}

/// Result of one online store lookup
enum LookupOutcome {
    Found(Option<StoredFeatures>),
    TimedOut,
    Failed,
}

impl ServingEngine {
    pub fn new(registry: FeatureRegistry, store: Arc<dyn OnlineStore>) -> Self {
        Self {
            registry,
            store,
            config: ServingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn OnlineStore> {
        &self.store
    }

    /// Serve a request against the current wall clock
    pub async fn get_online_features(
        &self,
        request: OnlineFeaturesRequest,
    ) -> Result<OnlineFeaturesResponse> {
        self.get_online_features_at(request, Utc::now()).await
    }

    /// Serve a request judging freshness against `now`
    #[instrument(
        skip_all,
        fields(
            project = %request.project,
            features = request.features.len(),
            rows = request.entity_rows.len()
        )
    )]
    pub async fn get_online_features_at(
        &self,
        request: OnlineFeaturesRequest,
        now: DateTime<Utc>,
    ) -> Result<OnlineFeaturesResponse> {
        let request_project = if request.project.is_empty() {
            DEFAULT_PROJECT
        } else {
            request.project.as_str()
        };

        // 1. Resolve (fail-fast)
        let (tables, ref_tables) = match tokio::time::timeout(
            self.config.registry_timeout,
            self.resolve(request_project, &request.features),
        )
        .await
        {
            Ok(resolved) => resolved?,
            Err(_) => {
                return Err(Error::timeout(format!(
                    "resolving feature references exceeded {:?}",
                    self.config.registry_timeout
                )))
            }
        };

        // 2. Derive entity keys, deduplicating lookups across rows
        let mut lookups: Vec<(usize, EntityKey)> = Vec::new();
        let mut lookup_index: HashMap<(usize, String), usize> = HashMap::new();
        let mut row_keys: Vec<Vec<RowKey>> = Vec::with_capacity(request.entity_rows.len());

        for row in &request.entity_rows {
            let mut keys = Vec::with_capacity(tables.len());
            for (t, resolved) in tables.iter().enumerate() {
                let key = match derive_key(resolved, &row.fields) {
                    Ok(key) => key,
                    Err(status) => {
                        keys.push(status);
                        continue;
                    }
                };
                let idx = match key.encode() {
                    Ok(encoded) => *lookup_index.entry((t, encoded)).or_insert_with(|| {
                        lookups.push((t, key));
                        lookups.len() - 1
                    }),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode entity key");
                        keys.push(RowKey::WrongEntityType);
                        continue;
                    }
                };
                keys.push(RowKey::Lookup(idx));
            }
            row_keys.push(keys);
        }

        // 3. Fan out
        let outcomes = self.run_lookups(&tables, lookups).await;

        // 4 + 5. Assemble in row order, reference order
        let mut response = OnlineFeaturesResponse {
            field_names: request.features.iter().map(|r| r.field_name()).collect(),
            field_statuses: Vec::with_capacity(row_keys.len()),
            field_values: Vec::with_capacity(row_keys.len()),
        };

        for keys in &row_keys {
            let mut statuses = Vec::with_capacity(request.features.len());
            let mut values = Vec::with_capacity(request.features.len());
            for (reference, &t) in request.features.iter().zip(&ref_tables) {
                let (status, value) = slot(&tables[t], reference, keys[t], &outcomes, now);
                statuses.push(status);
                values.push(value);
            }
            response.field_statuses.push(statuses);
            response.field_values.push(values);
        }

        debug!(lookups = outcomes.len(), "Online features served");
        Ok(response)
    }

    /// Resolve every reference; returns the distinct tables and, per
    /// reference, the index of its table
    async fn resolve(
        &self,
        request_project: &str,
        references: &[FeatureReference],
    ) -> Result<(Vec<ResolvedTable>, Vec<usize>)> {
        let mut tables: Vec<ResolvedTable> = Vec::new();
        let mut table_index: HashMap<(String, String), usize> = HashMap::new();
        let mut entity_types: HashMap<(String, String), ValueType> = HashMap::new();
        let mut ref_tables = Vec::with_capacity(references.len());

        for reference in references {
            let project = reference.resolve_project(request_project);
            let id = (project.to_string(), reference.feature_table.clone());

            let t = match table_index.get(&id) {
                Some(&t) => t,
                None => {
                    let table = self
                        .registry
                        .get_feature_table(project, &reference.feature_table)
                        .await
                        .map_err(|e| match e {
                            Error::NotFound { .. } => Error::UnknownFeature(format!(
                                "feature table '{}' does not exist in project '{}'",
                                reference.feature_table, project
                            )),
                            other => other,
                        })?;

                    let mut types = Vec::with_capacity(table.spec.entities.len());
                    for entity in &table.spec.entities {
                        let key = (project.to_string(), entity.clone());
                        let value_type = match entity_types.get(&key) {
                            Some(&value_type) => value_type,
                            None => {
                                let value_type = self
                                    .registry
                                    .get_entity(project, entity)
                                    .await
                                    .map_err(|e| match e {
                                        Error::NotFound { .. } => Error::internal(format!(
                                            "feature table '{}' references missing entity '{}'",
                                            reference.feature_table, entity
                                        )),
                                        other => other,
                                    })?
                                    .spec
                                    .value_type;
                                entity_types.insert(key, value_type);
                                value_type
                            }
                        };
                        types.push(value_type);
                    }

                    tables.push(ResolvedTable {
                        project: project.to_string(),
                        table,
                        entity_types: types,
                    });
                    table_index.insert(id, tables.len() - 1);
                    tables.len() - 1
                }
            };

            if tables[t].table.spec.feature(&reference.name).is_none() {
                return Err(Error::UnknownFeature(format!(
                    "feature '{}' is not defined in feature table '{}'",
                    reference.name, reference.feature_table
                )));
            }
            ref_tables.push(t);
        }

        Ok((tables, ref_tables))
    }

    /// One task per lookup; the `JoinSet` aborts whatever is still running if
    /// this future is dropped
    async fn run_lookups(
        &self,
        tables: &[ResolvedTable],
        lookups: Vec<(usize, EntityKey)>,
    ) -> Vec<LookupOutcome> {
        let mut outcomes: Vec<LookupOutcome> =
            (0..lookups.len()).map(|_| LookupOutcome::Failed).collect();
        let mut set = JoinSet::new();

        for (idx, (t, key)) in lookups.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let project = tables[t].project.clone();
            let table = tables[t].table.spec.name.clone();
            let timeout = self.config.lookup_timeout;
            let retry = self.config.lookup_retry.clone();

            set.spawn(async move {
                let lookup = retry_async(&retry, || store.get(&project, &table, &key));
                let outcome = match tokio::time::timeout(timeout, lookup).await {
                    Ok(Ok(features)) => LookupOutcome::Found(features),
                    Ok(Err(e)) => {
                        warn!(project = %project, table = %table, error = %e, "Online store lookup failed");
                        LookupOutcome::Failed
                    }
                    Err(_) => {
                        warn!(project = %project, table = %table, ?timeout, "Online store lookup timed out");
                        LookupOutcome::TimedOut
                    }
                };
                (idx, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = outcome,
                // Panicked task: its slot stays Failed
                Err(e) => warn!(error = %e, "Lookup task did not complete"),
            }
        }
        outcomes
    }
}

/// Join key of one row for one table, or the status its slots get instead
fn derive_key(
    resolved: &ResolvedTable,
    fields: &HashMap<String, Value>,
) -> std::result::Result<EntityKey, RowKey> {
    let mut key = EntityKey::new();
    for (entity, expected) in resolved
        .table
        .spec
        .entities
        .iter()
        .zip(&resolved.entity_types)
    {
        match fields.get(entity) {
            None => return Err(RowKey::MissingEntity),
            Some(value) if value.value_type() != *expected => {
                return Err(RowKey::WrongEntityType)
            }
            Some(value) => key.push(entity.clone(), value.clone()),
        }
    }
    Ok(key)
}

/// Status and value of one (row, reference) slot
fn slot(
    resolved: &ResolvedTable,
    reference: &FeatureReference,
    row_key: RowKey,
    outcomes: &[LookupOutcome],
    now: DateTime<Utc>,
) -> (FieldStatus, Option<Value>) {
    let idx = match row_key {
        RowKey::MissingEntity => return (FieldStatus::EntityNotFound, None),
        RowKey::WrongEntityType => return (FieldStatus::Error, None),
        RowKey::Lookup(idx) => idx,
    };

    let features = match &outcomes[idx] {
        LookupOutcome::Failed => return (FieldStatus::Error, None),
        LookupOutcome::TimedOut | LookupOutcome::Found(None) => {
            return (FieldStatus::NotFound, None)
        }
        LookupOutcome::Found(Some(features)) => features,
    };

    let stored = match features.get(&reference.name) {
        Some(stored) => stored,
        None => return (FieldStatus::NotFound, None),
    };

    let spec = &resolved.table.spec;
    if let Some(feature) = spec.feature(&reference.name) {
        if stored.value.value_type() != feature.value_type {
            return (FieldStatus::Error, None);
        }
    }

    if is_outdated(spec.max_age, stored.event_timestamp, now) {
        return (FieldStatus::Outdated, None);
    }
    (FieldStatus::Present, Some(stored.value.clone()))
}

/// `event_ts < now - max_age`, with a zero `max_age` disabling the check
pub(crate) fn is_outdated(max_age: Duration, event_ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    if max_age.is_zero() {
        return false;
    }
    // Negative age (event in the future) fails to convert and counts as fresh
    (now - event_ts)
        .to_std()
        .map(|age| age > max_age)
        .unwrap_or(false)
}
