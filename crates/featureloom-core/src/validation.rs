//! Spec validation rules
//!
//! Everything here is a pure function of the specs involved; checks that need
//! the registry (entity existence, project state) live in the registry crate.
//!
//! Two kinds of rules:
//! - **Shape**: is this spec well-formed on its own? (names, duplicates, sources)
//! - **Evolution**: may `existing` be replaced by `proposed`? (backward compatibility)

use std::collections::HashSet;

use crate::spec::{DataSource, EntitySpec, FeatureTableSpec, SourceKind, SourceOptions};
use crate::{Error, Result};

/// Longest accepted object name
pub const MAX_NAME_LEN: usize = 128;

/// Names are identifiers: `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_argument(format!(
            "{} name '{}' must match [a-zA-Z_][a-zA-Z0-9_]*",
            what, name
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_argument(format!(
            "{} name '{}' exceeds {} characters",
            what, name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

pub fn validate_entity_spec(spec: &EntitySpec) -> Result<()> {
    validate_name("Entity", &spec.name)
}

/// Shape rules for a feature table
///
/// Reports `DuplicateFeature` and `MissingSource` with their dedicated error
/// kinds; everything else is `InvalidArgument`.
pub fn validate_feature_table_spec(spec: &FeatureTableSpec) -> Result<()> {
    validate_name("Feature table", &spec.name)?;

    if spec.entities.is_empty() {
        return Err(Error::invalid_argument(format!(
            "Feature table '{}' must declare at least one entity",
            spec.name
        )));
    }
    let mut seen_entities = HashSet::new();
    for entity in &spec.entities {
        validate_name("Entity", entity)?;
        if !seen_entities.insert(entity.as_str()) {
            return Err(Error::invalid_argument(format!(
                "Entity '{}' is listed more than once in feature table '{}'",
                entity, spec.name
            )));
        }
    }

    let mut seen_features = HashSet::new();
    for feature in &spec.features {
        validate_name("Feature", &feature.name)?;
        if !seen_features.insert(feature.name.as_str()) {
            return Err(Error::DuplicateFeature {
                table: spec.name.clone(),
                feature: feature.name.clone(),
            });
        }
    }

    match &spec.batch_source {
        Some(source) if source.kind().is_batch() => validate_source(&spec.name, source)?,
        _ => return Err(Error::MissingSource(spec.name.clone())),
    }

    if let Some(source) = &spec.stream_source {
        if source.kind() != SourceKind::Stream {
            return Err(Error::invalid_argument(format!(
                "Stream source of feature table '{}' must be of type STREAM",
                spec.name
            )));
        }
        validate_source(&spec.name, source)?;
    }

    Ok(())
}

fn validate_source(table: &str, source: &DataSource) -> Result<()> {
    if source.event_timestamp_column.trim().is_empty() {
        return Err(Error::invalid_argument(format!(
            "Data source of feature table '{}' requires an event_timestamp_column",
            table
        )));
    }

    let required: &[(&str, &str)] = match &source.options {
        SourceOptions::BatchFile {
            file_url,
            file_format,
        } => &[("file_url", file_url), ("file_format", file_format)],
        SourceOptions::BatchTable { table_ref } => &[("table_ref", table_ref)],
        SourceOptions::Stream {
            bootstrap_servers,
            topic,
            message_format,
        } => &[
            ("bootstrap_servers", bootstrap_servers),
            ("topic", topic),
            ("message_format", message_format),
        ],
    };
    for (option, value) in required {
        if value.trim().is_empty() {
            return Err(Error::invalid_argument(format!(
                "Data source of feature table '{}' is missing option '{}'",
                table, option
            )));
        }
    }
    Ok(())
}

/// Only description and labels of an entity may change
pub fn check_entity_update(existing: &EntitySpec, proposed: &EntitySpec) -> Result<()> {
    if existing.value_type != proposed.value_type {
        return Err(Error::incompatible(format!(
            "Entity '{}' has value type {} and cannot be changed to {}",
            existing.name, existing.value_type, proposed.value_type
        )));
    }
    Ok(())
}

/// The join key and the types of surviving features are frozen
pub fn check_feature_table_update(
    existing: &FeatureTableSpec,
    proposed: &FeatureTableSpec,
) -> Result<()> {
    if existing.entities != proposed.entities {
        return Err(Error::incompatible(format!(
            "Entities of feature table '{}' cannot change from {:?} to {:?}",
            existing.name, existing.entities, proposed.entities
        )));
    }
    for feature in &proposed.features {
        if let Some(old) = existing.feature(&feature.name) {
            if old.value_type != feature.value_type {
                return Err(Error::incompatible(format!(
                    "Feature '{}' of feature table '{}' has value type {} and cannot be changed to {}",
                    feature.name, existing.name, old.value_type, feature.value_type
                )));
            }
        }
    }
    Ok(())
}
