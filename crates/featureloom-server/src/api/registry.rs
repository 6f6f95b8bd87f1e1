//! Registry REST API
//!
//! - `POST /api/v1/projects` - Create a project
//! - `GET /api/v1/projects` - List active projects
//! - `POST /api/v1/projects/:project/archive` - Archive a project
//! - `POST /api/v1/projects/:project/entities` - Apply an entity
//! - `GET /api/v1/projects/:project/entities?labels=k:v,...` - List entities
//! - `GET /api/v1/projects/:project/entities/:name` - Get an entity
//! - `POST /api/v1/projects/:project/feature-tables` - Apply a feature table
//! - `GET /api/v1/projects/:project/feature-tables?labels=k:v,...` - List feature tables
//! - `GET /api/v1/projects/:project/feature-tables/:name` - Get a feature table
//! - `DELETE /api/v1/projects/:project/feature-tables/:name` - Delete a feature table

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use featureloom_core::{Entity, EntitySpec, Error, FeatureTable, FeatureTableSpec, Labels, Project};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::Result,
    metrics,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Comma-separated `key:value` pairs; every pair must match
    pub labels: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<Project>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListEntitiesResponse {
    pub entities: Vec<Entity>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListFeatureTablesResponse {
    pub feature_tables: Vec<FeatureTable>,
    pub count: usize,
}

/// Count the call by outcome and lift the error into an HTTP error
fn observed<T>(operation: &str, result: featureloom_core::Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            metrics::record_registry_operation(operation, "OK");
            Ok(value)
        }
        Err(e) => {
            metrics::record_registry_operation(operation, e.code());
            Err(e.into())
        }
    }
}

/// Parse `team:pricing,tier:gold` into a label filter
pub fn parse_label_filter(raw: Option<&str>) -> std::result::Result<Labels, Error> {
    let mut labels = Labels::new();
    let Some(raw) = raw else {
        return Ok(labels);
    };
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once(':') {
            Some((key, value)) if !key.is_empty() => {
                labels.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(Error::invalid_argument(format!(
                    "label filter '{}' must have the form key:value",
                    pair
                )))
            }
        }
    }
    Ok(labels)
}

fn label_filter(params: std::result::Result<Query<ListParams>, QueryRejection>) -> Result<Labels> {
    let Query(params) = params?;
    Ok(parse_label_filter(params.labels.as_deref())?)
}

// ============================================================================
// Projects
// ============================================================================

/// `POST /api/v1/projects` - `201 Created` with the project
#[instrument(skip_all, fields(project = tracing::field::Empty))]
pub async fn create_project(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>)> {
    let Json(req) = payload?;
    tracing::Span::current().record("project", req.name.as_str());
    let project = observed(
        "create_project",
        state.registry().create_project(&req.name).await,
    )?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /api/v1/projects`
#[instrument(skip(state))]
pub async fn list_projects(State(state): State<AppState>) -> Result<Json<ListProjectsResponse>> {
    let projects = observed("list_projects", state.registry().list_projects().await)?;
    Ok(Json(ListProjectsResponse {
        count: projects.len(),
        projects,
    }))
}

/// `POST /api/v1/projects/:project/archive` - `204 No Content`
#[instrument(skip(state))]
pub async fn archive_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<StatusCode> {
    observed(
        "archive_project",
        state.registry().archive_project(&project).await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Entities
// ============================================================================

/// `POST /api/v1/projects/:project/entities`
///
/// ## Request Body
/// ```json
/// { "name": "driver_id", "value_type": "INT64", "labels": {"team": "pricing"} }
/// ```
///
/// Returns the stored entity with its current `meta.version`.
#[instrument(skip(state, payload))]
pub async fn apply_entity(
    State(state): State<AppState>,
    Path(project): Path<String>,
    payload: std::result::Result<Json<EntitySpec>, JsonRejection>,
) -> Result<Json<Entity>> {
    let Json(spec) = payload?;
    let entity = observed(
        "apply_entity",
        state.registry().apply_entity(&project, spec).await,
    )?;
    Ok(Json(entity))
}

/// `GET /api/v1/projects/:project/entities?labels=k:v`
#[instrument(skip(state, params))]
pub async fn list_entities(
    State(state): State<AppState>,
    Path(project): Path<String>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListEntitiesResponse>> {
    let filter = label_filter(params)?;
    let entities = observed(
        "list_entities",
        state.registry().list_entities(&project, &filter).await,
    )?;
    Ok(Json(ListEntitiesResponse {
        count: entities.len(),
        entities,
    }))
}

/// `GET /api/v1/projects/:project/entities/:name`
#[instrument(skip(state))]
pub async fn get_entity(
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Entity>> {
    let entity = observed("get_entity", state.registry().get_entity(&project, &name).await)?;
    Ok(Json(entity))
}

// ============================================================================
// Feature tables
// ============================================================================

/// `POST /api/v1/projects/:project/feature-tables`
///
/// ## Request Body
/// ```json
/// {
///   "name": "driver_stats",
///   "entities": ["driver_id"],
///   "features": [{"name": "rating", "value_type": "FLOAT"}],
///   "max_age": 3600,
///   "batch_source": {
///     "type": "BATCH_FILE",
///     "file_url": "s3://bucket/driver_stats",
///     "file_format": "parquet",
///     "event_timestamp_column": "event_ts"
///   }
/// }
/// ```
#[instrument(skip(state, payload))]
pub async fn apply_feature_table(
    State(state): State<AppState>,
    Path(project): Path<String>,
    payload: std::result::Result<Json<FeatureTableSpec>, JsonRejection>,
) -> Result<Json<FeatureTable>> {
    let Json(spec) = payload?;
    let table = observed(
        "apply_feature_table",
        state.registry().apply_feature_table(&project, spec).await,
    )?;
    Ok(Json(table))
}

/// `GET /api/v1/projects/:project/feature-tables?labels=k:v`
#[instrument(skip(state, params))]
pub async fn list_feature_tables(
    State(state): State<AppState>,
    Path(project): Path<String>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListFeatureTablesResponse>> {
    let filter = label_filter(params)?;
    let feature_tables = observed(
        "list_feature_tables",
        state.registry().list_feature_tables(&project, &filter).await,
    )?;
    Ok(Json(ListFeatureTablesResponse {
        count: feature_tables.len(),
        feature_tables,
    }))
}

/// `GET /api/v1/projects/:project/feature-tables/:name`
#[instrument(skip(state))]
pub async fn get_feature_table(
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<FeatureTable>> {
    let table = observed(
        "get_feature_table",
        state.registry().get_feature_table(&project, &name).await,
    )?;
    Ok(Json(table))
}

/// `DELETE /api/v1/projects/:project/feature-tables/:name` - `204 No Content`
#[instrument(skip(state))]
pub async fn delete_feature_table(
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    observed(
        "delete_feature_table",
        state.registry().delete_feature_table(&project, &name).await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}
