//! Error types for FeatureLoom
//!
//! Every failure a caller can observe from the registry or the serving engine
//! is one of these variants. Per-slot degradations during serving
//! (`NOT_FOUND`, `OUTDATED`, ...) are *not* errors; they are reported in the
//! response status matrix instead.
//!
//! We use the `thiserror` crate to keep the definitions concise.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of registry object, used to give `NotFound` some context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Project,
    Entity,
    FeatureTable,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "Project"),
            Self::Entity => write!(f, "Entity"),
            Self::FeatureTable => write!(f, "FeatureTable"),
        }
    }
}

/// All possible errors that can occur in FeatureLoom
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown registry object
    #[error("{kind} '{name}' not found in project '{project}'")]
    NotFound {
        kind: ObjectKind,
        project: String,
        name: String,
    },

    /// An update would break consumers of an existing object
    /// (entity value type change, feature table entity list change, ...)
    #[error("Incompatible schema change: {0}")]
    IncompatibleSchema(String),

    /// A feature table references an entity that is not registered
    #[error("Feature table '{table}' references unknown entity '{entity}' in project '{project}'")]
    UnknownEntity {
        project: String,
        table: String,
        entity: String,
    },

    /// Two features of one table share a name
    #[error("Feature '{feature}' is defined more than once in feature table '{table}'")]
    DuplicateFeature { table: String, feature: String },

    /// A feature table has no batch source
    #[error("Feature table '{0}' must have exactly one batch source")]
    MissingSource(String),

    /// A serving request references a table or feature that does not exist
    #[error("Unknown feature reference: {0}")]
    UnknownFeature(String),

    /// Missing or invalid credentials on a secure channel
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed names, malformed requests, archived projects
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic write lost the race against a concurrent writer.
    ///
    /// The registry retries these internally; callers only see this if they
    /// talk to a `SpecStore` directly.
    #[error("Version conflict on '{key}': expected {expected:?}, found {actual:?}")]
    VersionConflict {
        key: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Storage backend failure (SQLite, Redis, ...)
    ///
    /// We wrap the original error to preserve its context chain.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal failure (exhausted retries, bugs)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: ObjectKind, project: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            project: project.into(),
            name: name.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleSchema(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// True for failures that may succeed when simply tried again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Storage(_) | Self::Timeout(_))
    }

    /// Machine-readable code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IncompatibleSchema(_) => "INCOMPATIBLE_SCHEMA",
            Self::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            Self::DuplicateFeature { .. } => "DUPLICATE_FEATURE",
            Self::MissingSource(_) => "MISSING_SOURCE",
            Self::UnknownFeature(_) => "UNKNOWN_FEATURE",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::VersionConflict { .. }
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found(ObjectKind::Entity, "default", "driver_id");
        assert_eq!(
            err.to_string(),
            "Entity 'driver_id' not found in project 'default'"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::MissingSource("t".into()).code(), "MISSING_SOURCE");
        assert_eq!(
            Error::Storage(anyhow::anyhow!("disk on fire")).code(),
            "INTERNAL"
        );
        assert_eq!(Error::timeout("lookup").code(), "TIMEOUT");
    }

    #[test]
    fn test_retryable() {
        let conflict = Error::VersionConflict {
            key: "default/driver".into(),
            expected: Some(1),
            actual: Some(2),
        };
        assert!(conflict.is_retryable());
        assert!(Error::Storage(anyhow::anyhow!("connection reset")).is_retryable());
        assert!(!Error::invalid_argument("bad name").is_retryable());
        assert!(!Error::incompatible("type change").is_retryable());
    }
}
