//! # FeatureLoom Core Library
//!
//! Foundation crate shared by the registry, the online stores, the serving
//! engine and the HTTP server.
//!
//! ## Key Components
//!
//! - **Spec model** (`spec`): projects, entities, feature tables, data sources
//! - **Serving types** (`types`): values, feature references, requests, responses
//! - **OnlineStore**: the trait every online store backend implements
//! - **Validation**: shape and evolution rules for registry specs
//! - **Retry**: exponential backoff for transient failures
//! - **Errors**: the error taxonomy every caller observes
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featureloom_core::prelude::*;
//!
//! let table = FeatureTableSpec::new("driver_stats", vec!["driver_id".into()])
//!     .with_feature("rating", ValueType::Float)
//!     .with_batch_source(DataSource::file("file:///data", "parquet", "event_ts"));
//! ```

// Re-export commonly used types so users can write
// `use featureloom_core::EntityKey` instead of the full module path
pub use error::{Error, ObjectKind, Result};
pub use online_store::{
    build_online_key, merge_features, EntityKey, OnlineRow, OnlineStore, StoredFeatureValue,
    StoredFeatures,
};
pub use spec::{
    labels_match, DataSource, Entity, EntitySpec, FeatureSpec, FeatureTable, FeatureTableSpec,
    Labels, ObjectMeta, Project, SourceKind, SourceOptions, DEFAULT_PROJECT,
};
pub use types::{
    EntityRow, FeatureReference, FieldStatus, OnlineFeaturesRequest, OnlineFeaturesResponse,
    Value, ValueType,
};

mod error;
pub mod online_store;
pub mod retry;
pub mod spec;
pub mod types;
pub mod validation;

// `use featureloom_core::prelude::*` brings in everything most callers need
pub mod prelude {
    pub use crate::error::{Error, ObjectKind, Result};
    pub use crate::online_store::{EntityKey, OnlineRow, OnlineStore, StoredFeatures};
    pub use crate::spec::{
        DataSource, Entity, EntitySpec, FeatureTable, FeatureTableSpec, Project, DEFAULT_PROJECT,
    };
    pub use crate::types::{
        EntityRow, FeatureReference, FieldStatus, OnlineFeaturesRequest, OnlineFeaturesResponse,
        Value, ValueType,
    };
}
