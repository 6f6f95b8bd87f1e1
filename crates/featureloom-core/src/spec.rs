//! Registry object model: projects, entities, feature tables and data sources
//!
//! A registry object is split into a user-supplied *spec* (what gets applied)
//! and server-maintained *meta* (version counter and timestamps). Two applies
//! are compared on their specs only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::ValueType;

/// Name of the project that always exists
pub const DEFAULT_PROJECT: &str = "default";

/// Free-form key/value labels, kept ordered for stable serialization
pub type Labels = BTreeMap<String, String>;

/// Tenant namespace scoping all registry objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archived: false,
            created_at: Utc::now(),
        }
    }
}

/// Server-maintained metadata of a registry object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Monotonic version, starting at 1 and bumped on every change
    pub version: u64,
    pub created_timestamp: DateTime<Utc>,
    pub last_updated_timestamp: DateTime<Utc>,
}

impl ObjectMeta {
    pub fn first(now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            created_timestamp: now,
            last_updated_timestamp: now,
        }
    }

    /// Meta for the next version of an object
    pub fn bumped(&self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version + 1,
            created_timestamp: self.created_timestamp,
            last_updated_timestamp: now,
        }
    }
}

/// User-supplied definition of an entity (a join-key dimension)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Labels,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            description: String::new(),
            labels: Labels::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A registered entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub project: String,
    pub spec: EntitySpec,
    pub meta: ObjectMeta,
}

/// Definition of one feature inside a feature table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub labels: Labels,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            labels: Labels::new(),
        }
    }
}

/// Discriminant of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    BatchFile,
    BatchTable,
    Stream,
}

impl SourceKind {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::BatchFile | Self::BatchTable)
    }
}

/// Kind-specific option bag of a data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOptions {
    BatchFile {
        file_url: String,
        file_format: String,
    },
    BatchTable {
        table_ref: String,
    },
    Stream {
        bootstrap_servers: String,
        topic: String,
        message_format: String,
    },
}

/// Where materialization reads a feature table's data from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(flatten)]
    pub options: SourceOptions,
    pub event_timestamp_column: String,
    /// Empty string means unset
    #[serde(default)]
    pub date_partition_column: String,
}

impl DataSource {
    pub fn file(
        file_url: impl Into<String>,
        file_format: impl Into<String>,
        event_timestamp_column: impl Into<String>,
    ) -> Self {
        Self {
            options: SourceOptions::BatchFile {
                file_url: file_url.into(),
                file_format: file_format.into(),
            },
            event_timestamp_column: event_timestamp_column.into(),
            date_partition_column: String::new(),
        }
    }

    pub fn table(table_ref: impl Into<String>, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            options: SourceOptions::BatchTable {
                table_ref: table_ref.into(),
            },
            event_timestamp_column: event_timestamp_column.into(),
            date_partition_column: String::new(),
        }
    }

    pub fn stream(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        message_format: impl Into<String>,
        event_timestamp_column: impl Into<String>,
    ) -> Self {
        Self {
            options: SourceOptions::Stream {
                bootstrap_servers: bootstrap_servers.into(),
                topic: topic.into(),
                message_format: message_format.into(),
            },
            event_timestamp_column: event_timestamp_column.into(),
            date_partition_column: String::new(),
        }
    }

    pub fn with_date_partition_column(mut self, column: impl Into<String>) -> Self {
        self.date_partition_column = column.into();
        self
    }

    pub fn kind(&self) -> SourceKind {
        match self.options {
            SourceOptions::BatchFile { .. } => SourceKind::BatchFile,
            SourceOptions::BatchTable { .. } => SourceKind::BatchTable,
            SourceOptions::Stream { .. } => SourceKind::Stream,
        }
    }

    pub fn date_partition_column(&self) -> Option<&str> {
        if self.date_partition_column.is_empty() {
            None
        } else {
            Some(&self.date_partition_column)
        }
    }
}

/// User-supplied definition of a feature table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTableSpec {
    pub name: String,
    /// Ordered composite join key
    pub entities: Vec<String>,
    pub features: Vec<FeatureSpec>,
    /// Zero disables the staleness check
    #[serde(default, with = "duration_secs")]
    pub max_age: Duration,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub batch_source: Option<DataSource>,
    #[serde(default)]
    pub stream_source: Option<DataSource>,
}

impl FeatureTableSpec {
    pub fn new(name: impl Into<String>, entities: Vec<String>) -> Self {
        Self {
            name: name.into(),
            entities,
            features: Vec::new(),
            max_age: Duration::ZERO,
            labels: Labels::new(),
            batch_source: None,
            stream_source: None,
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.features.push(FeatureSpec::new(name, value_type));
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_batch_source(mut self, source: DataSource) -> Self {
        self.batch_source = Some(source);
        self
    }

    pub fn with_stream_source(mut self, source: DataSource) -> Self {
        self.stream_source = Some(source);
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// A registered feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub project: String,
    pub spec: FeatureTableSpec,
    pub meta: ObjectMeta,
}

/// True when every `filter` label is present in `labels` with the same value
pub fn labels_match(labels: &Labels, filter: &Labels) -> bool {
    filter.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// `max_age` travels as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
