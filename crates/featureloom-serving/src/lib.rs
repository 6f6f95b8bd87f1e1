//! FeatureLoom Serving - freshness-aware online feature retrieval
//!
//! The [`ServingEngine`] answers `GetOnlineFeatures`: given feature
//! references and entity rows it returns, per row and per reference, the latest
//! stored value together with a status:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `PRESENT` | value found and fresh |
//! | `NOT_FOUND` | nothing stored for the key, or the lookup timed out |
//! | `OUTDATED` | stored value older than the table's `max_age` (value omitted) |
//! | `ENTITY_NOT_FOUND` | the row lacks an entity the table is keyed on |
//! | `ERROR` | backend failure after retries, or a mistyped entity value |
//!
//! The engine holds no state between calls; it can be cloned freely and
//! shared across request handlers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use featureloom_serving::ServingEngine;
//!
//! let engine = ServingEngine::new(registry, Arc::new(InMemoryOnlineStore::new()));
//! let response = engine.get_online_features(request).await?;
//! ```

mod engine;

pub use engine::{ServingConfig, ServingEngine};
