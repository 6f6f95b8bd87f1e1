//! E2E tests for the spec model and its validation rules
//!
//! Exercises the public API the way the registry and the HTTP layer use it:
//! - Specs parsed from the JSON wire format
//! - Shape validation of realistic feature tables
//! - Evolution rules between two versions of a spec
//! - Serving request/response wire format

use featureloom_core::validation::{
    check_feature_table_update, validate_entity_spec, validate_feature_table_spec,
};
use featureloom_core::{
    EntitySpec, Error, FeatureReference, FeatureTableSpec, FieldStatus, OnlineFeaturesRequest,
    OnlineFeaturesResponse, SourceKind, Value, ValueType,
};
use std::time::Duration;

// ============================================================================
// Wire format
// ============================================================================

#[test]
fn test_e2e_feature_table_from_json() {
    // Given: A feature table as a client would send it
    let json = r#"{
        "name": "driver_trips",
        "entities": ["driver_id"],
        "features": [
            {"name": "trips_today", "value_type": "INT32"},
            {"name": "avg_rating", "value_type": "FLOAT", "labels": {"owner": "pricing"}}
        ],
        "max_age": 3600,
        "labels": {"team": "pricing"},
        "batch_source": {
            "type": "BATCH_FILE",
            "file_url": "file:///data/driver_trips",
            "file_format": "parquet",
            "event_timestamp_column": "event_ts",
            "date_partition_column": "dt"
        },
        "stream_source": {
            "type": "STREAM",
            "bootstrap_servers": "kafka:9092",
            "topic": "driver_trips",
            "message_format": "avro",
            "event_timestamp_column": "event_ts"
        }
    }"#;

    // When: Parsed
    let spec: FeatureTableSpec = serde_json::from_str(json).unwrap();

    // Then: Every field lands where expected and the spec validates
    assert_eq!(spec.max_age, Duration::from_secs(3600));
    assert_eq!(spec.features.len(), 2);
    assert_eq!(spec.features[1].labels["owner"], "pricing");
    let batch = spec.batch_source.as_ref().unwrap();
    assert_eq!(batch.kind(), SourceKind::BatchFile);
    assert_eq!(batch.date_partition_column(), Some("dt"));
    assert_eq!(
        spec.stream_source.as_ref().unwrap().kind(),
        SourceKind::Stream
    );
    assert!(validate_feature_table_spec(&spec).is_ok());
}

#[test]
fn test_e2e_online_request_from_json() {
    // Given: A request mixing both feature reference forms
    let json = r#"{
        "project": "default",
        "features": ["driver_stats:rating", {"feature_table": "driver_stats", "name": "trips_today"}],
        "entity_rows": [{"fields": {"driver_id": {"int64_val": 1001}}}]
    }"#;

    // When: Parsed
    let request: OnlineFeaturesRequest = serde_json::from_str(json).unwrap();

    // Then: References and entity values are typed
    assert_eq!(request.features.len(), 2);
    assert_eq!(
        request.features[1],
        FeatureReference::new("driver_stats", "trips_today")
    );
    assert_eq!(
        request.entity_rows[0].fields["driver_id"],
        Value::Int64(1001)
    );
}

#[test]
fn test_e2e_malformed_reference_rejected() {
    let json = r#"{"features": ["no_colon_here"], "entity_rows": []}"#;
    assert!(serde_json::from_str::<OnlineFeaturesRequest>(json).is_err());
}

#[test]
fn test_e2e_response_omits_nothing_positionally() {
    // Given: A response with a missing slot
    let response = OnlineFeaturesResponse {
        field_names: vec!["driver_stats:rating".into()],
        field_statuses: vec![vec![FieldStatus::Present], vec![FieldStatus::NotFound]],
        field_values: vec![vec![Some(Value::Float(4.5))], vec![None]],
    };

    // When: Serialized
    let json = serde_json::to_value(&response).unwrap();

    // Then: Missing values are explicit nulls so positions line up
    assert_eq!(json["field_statuses"][1][0], "NOT_FOUND");
    assert!(json["field_values"][1][0].is_null());
    assert_eq!(json["field_values"][0][0]["float_val"], 4.5);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_e2e_entity_names() {
    assert!(validate_entity_spec(&EntitySpec::new("driver_id", ValueType::Int64)).is_ok());
    assert!(matches!(
        validate_entity_spec(&EntitySpec::new("driver-id", ValueType::Int64)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_e2e_table_without_source_is_missing_source() {
    let json = r#"{"name": "t", "entities": ["e"], "features": [{"name": "f", "value_type": "INT64"}]}"#;
    let spec: FeatureTableSpec = serde_json::from_str(json).unwrap();
    let err = validate_feature_table_spec(&spec).unwrap_err();
    assert_eq!(err.code(), "MISSING_SOURCE");
}

#[test]
fn test_e2e_adding_features_is_compatible() {
    // Given: A registered table and a new version with one more feature
    let v1: FeatureTableSpec = serde_json::from_str(
        r#"{"name": "t", "entities": ["e"], "features": [{"name": "f", "value_type": "INT64"}],
            "batch_source": {"type": "BATCH_TABLE", "table_ref": "ds.t", "event_timestamp_column": "ts"}}"#,
    )
    .unwrap();
    let v2 = v1.clone().with_feature("g", ValueType::StringList);

    // Then: The update is allowed, removing the feature again is allowed too
    assert!(check_feature_table_update(&v1, &v2).is_ok());
    assert!(check_feature_table_update(&v2, &v1).is_ok());
}
