//! Core value and serving types for FeatureLoom
//!
//! Values are a tagged union: every `Value` carries its own `ValueType`, so
//! consumers match exhaustively instead of guessing from JSON shapes.
//!
//! ## Wire format
//!
//! Values serialize as single-key objects naming the variant:
//! - `Value::Int64(5)` → `{"int64_val": 5}`
//! - `Value::FloatList(vec![1.0])` → `{"float_list_val": [1.0]}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{Error, Result};

/// Fixed enumeration of feature and entity value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Int32,
    Int64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Int32List,
    Int64List,
    FloatList,
    DoubleList,
    BoolList,
    StringList,
    BytesList,
}

impl ValueType {
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::Int32List
                | Self::Int64List
                | Self::FloatList
                | Self::DoubleList
                | Self::BoolList
                | Self::StringList
                | Self::BytesList
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Bool => "BOOL",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::Int32List => "INT32_LIST",
            Self::Int64List => "INT64_LIST",
            Self::FloatList => "FLOAT_LIST",
            Self::DoubleList => "DOUBLE_LIST",
            Self::BoolList => "BOOL_LIST",
            Self::StringList => "STRING_LIST",
            Self::BytesList => "BYTES_LIST",
        };
        f.write_str(s)
    }
}

/// A typed feature or entity value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "int32_val")]
    Int32(i32),
    #[serde(rename = "int64_val")]
    Int64(i64),
    #[serde(rename = "float_val")]
    Float(f32),
    #[serde(rename = "double_val")]
    Double(f64),
    #[serde(rename = "bool_val")]
    Bool(bool),
    #[serde(rename = "string_val")]
    String(String),
    #[serde(rename = "bytes_val")]
    Bytes(Vec<u8>),
    #[serde(rename = "int32_list_val")]
    Int32List(Vec<i32>),
    #[serde(rename = "int64_list_val")]
    Int64List(Vec<i64>),
    #[serde(rename = "float_list_val")]
    FloatList(Vec<f32>),
    #[serde(rename = "double_list_val")]
    DoubleList(Vec<f64>),
    #[serde(rename = "bool_list_val")]
    BoolList(Vec<bool>),
    #[serde(rename = "string_list_val")]
    StringList(Vec<String>),
    #[serde(rename = "bytes_list_val")]
    BytesList(Vec<Vec<u8>>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Bool(_) => ValueType::Bool,
            Self::String(_) => ValueType::String,
            Self::Bytes(_) => ValueType::Bytes,
            Self::Int32List(_) => ValueType::Int32List,
            Self::Int64List(_) => ValueType::Int64List,
            Self::FloatList(_) => ValueType::FloatList,
            Self::DoubleList(_) => ValueType::DoubleList,
            Self::BoolList(_) => ValueType::BoolList,
            Self::StringList(_) => ValueType::StringList,
            Self::BytesList(_) => ValueType::BytesList,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Per-slot outcome of an online lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    /// Value found and within `max_age`
    Present,
    /// No stored value for the entity key (or the lookup timed out)
    NotFound,
    /// Stored value is older than `max_age`; the value is omitted
    Outdated,
    /// The entity row lacks a value for one of the table's entities
    EntityNotFound,
    /// The lookup failed or the entity value had the wrong type
    Error,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::NotFound => "NOT_FOUND",
            Self::Outdated => "OUTDATED",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::Error => "ERROR",
        }
    }
}

/// Reference to a feature: `(feature_table, name)` with an optional project override
///
/// Accepted on the wire either as an object or as the string form
/// `[project/]table:feature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FeatureReferenceRepr")]
pub struct FeatureReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub feature_table: String,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureReferenceRepr {
    Text(String),
    Structured {
        #[serde(default)]
        project: Option<String>,
        feature_table: String,
        name: String,
    },
}

impl TryFrom<FeatureReferenceRepr> for FeatureReference {
    type Error = Error;

    fn try_from(repr: FeatureReferenceRepr) -> Result<Self> {
        match repr {
            FeatureReferenceRepr::Text(text) => text.parse(),
            FeatureReferenceRepr::Structured {
                project,
                feature_table,
                name,
            } => Ok(Self {
                project: project.filter(|p| !p.is_empty()),
                feature_table,
                name,
            }),
        }
    }
}

impl FeatureReference {
    pub fn new(feature_table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: None,
            feature_table: feature_table.into(),
            name: name.into(),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Project this reference resolves in: its own override, else the request's
    pub fn resolve_project<'a>(&'a self, request_project: &'a str) -> &'a str {
        self.project.as_deref().unwrap_or(request_project)
    }

    /// `table:feature`, the name used for response columns
    pub fn field_name(&self) -> String {
        format!("{}:{}", self.feature_table, self.name)
    }
}

impl std::str::FromStr for FeatureReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (project, rest) = match s.split_once('/') {
            Some((project, rest)) => (Some(project.to_string()), rest),
            None => (None, s),
        };
        let (table, feature) = rest.split_once(':').ok_or_else(|| {
            Error::invalid_argument(format!(
                "Feature reference '{}' must have the form [project/]table:feature",
                s
            ))
        })?;
        if table.is_empty() || feature.is_empty() || project.as_deref() == Some("") {
            return Err(Error::invalid_argument(format!(
                "Feature reference '{}' has an empty component",
                s
            )));
        }
        Ok(Self {
            project,
            feature_table: table.to_string(),
            name: feature.to_string(),
        })
    }
}

impl fmt::Display for FeatureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}/{}:{}", project, self.feature_table, self.name),
            None => write!(f, "{}:{}", self.feature_table, self.name),
        }
    }
}

/// One client-supplied set of entity values
///
/// The timestamp is carried for request correlation only; staleness is judged
/// against the stored value's event timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EntityRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity value (builder pattern)
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// `GetOnlineFeatures` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnlineFeaturesRequest {
    #[serde(default)]
    pub project: String,
    pub features: Vec<FeatureReference>,
    #[serde(default)]
    pub entity_rows: Vec<EntityRow>,
}

/// `GetOnlineFeatures` response
///
/// Outer index = entity row, inner index = requested feature, both in request
/// order. A value is `None` whenever its status is not `PRESENT`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineFeaturesResponse {
    pub field_names: Vec<String>,
    pub field_statuses: Vec<Vec<FieldStatus>>,
    pub field_values: Vec<Vec<Option<Value>>>,
}
