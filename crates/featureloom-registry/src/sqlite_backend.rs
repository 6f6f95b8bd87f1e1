//! SQLite spec store with WAL mode
//!
//! Suitable for:
//! - Single-node deployments that must survive restarts
//! - Embedded deployments (no external dependencies)
//! - Development and testing
//!
//! The connection mutex is held for one statement at a time. Compare-and-swap
//! relies on SQLite's per-statement atomicity: a write whose `WHERE version = ?`
//! matches no row lost the race.

use crate::backend::{object_key, SpecStore};
use crate::schema;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use featureloom_core::{
    Entity, EntitySpec, Error, FeatureTable, FeatureTableSpec, ObjectMeta, Project, Result,
    DEFAULT_PROJECT,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const ENTITIES: &str = "entities";
const FEATURE_TABLES: &str = "feature_tables";

/// SQLite spec store with WAL mode
pub struct SqliteSpecStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSpecStore {
    /// Open (or create) a registry database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:" || path_str.starts_with("file::memory:");

        if !is_memory {
            if let Some(parent) = path.as_ref().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create directory {:?}", parent))?;
                }
            }
        }

        let db = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .context("Failed to open SQLite connection for registry")?;

        // WAL only applies to file-backed databases
        if !is_memory {
            db.pragma_update(None, "journal_mode", "WAL")
                .context("Failed to enable WAL mode")?;

            // Wait for locks instead of failing immediately
            db.pragma_update(None, "busy_timeout", 5000)
                .context("Failed to set busy timeout")?;

            db.pragma_update(None, "synchronous", "NORMAL")
                .context("Failed to set synchronous mode")?;

            info!("Initialized SQLite registry at {:?} with WAL mode", path.as_ref());
        } else {
            info!("Initialized in-memory SQLite registry");
        }

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Create in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db =
            Connection::open_in_memory().context("Failed to create in-memory SQLite connection")?;

        info!("Initialized in-memory SQLite registry");

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| Error::Storage(anyhow!("SQLite registry connection mutex poisoned")))
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}' in registry", s))?;
    Ok(ts.with_timezone(&Utc))
}

fn project_from_row(name: String, archived: bool, created_at: String) -> Result<Project> {
    Ok(Project {
        name,
        archived,
        created_at: parse_ts(&created_at)?,
    })
}

/// Raw `(project, spec, meta)` columns of one object row
type RawObject = (String, String, String);

fn get_raw(db: &Connection, table: &str, project: &str, name: &str) -> Result<Option<RawObject>> {
    let raw = db
        .query_row(
            &format!(
                "SELECT project, spec, meta FROM {} WHERE project = ?1 AND name = ?2",
                table
            ),
            params![project, name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .with_context(|| format!("Failed to read {} '{}'", table, object_key(project, name)))?;
    Ok(raw)
}

fn list_raw(db: &Connection, table: &str, project: &str) -> Result<Vec<RawObject>> {
    let mut stmt = db
        .prepare(&format!(
            "SELECT project, spec, meta FROM {} WHERE project = ?1 ORDER BY name",
            table
        ))
        .context("Failed to prepare list query")?;

    let rows = stmt
        .query_map(params![project], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .with_context(|| format!("Failed to list {} of project '{}'", table, project))?
        .collect::<rusqlite::Result<Vec<RawObject>>>()
        .context("Failed to read registry row")?;
    Ok(rows)
}

fn current_version(db: &Connection, table: &str, project: &str, name: &str) -> Result<Option<u64>> {
    let version: Option<i64> = db
        .query_row(
            &format!(
                "SELECT version FROM {} WHERE project = ?1 AND name = ?2",
                table
            ),
            params![project, name],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read object version")?;
    Ok(version.map(|v| v as u64))
}

#[allow(clippy::too_many_arguments)]
fn put_raw(
    db: &Connection,
    table: &str,
    project: &str,
    name: &str,
    version: u64,
    spec: &str,
    meta: &str,
    expected_version: Option<u64>,
) -> Result<()> {
    let changed = match expected_version {
        None => db.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (project, name, version, spec, meta) VALUES (?1, ?2, ?3, ?4, ?5)",
                table
            ),
            params![project, name, version as i64, spec, meta],
        ),
        Some(expected) => db.execute(
            &format!(
                "UPDATE {} SET version = ?3, spec = ?4, meta = ?5 WHERE project = ?1 AND name = ?2 AND version = ?6",
                table
            ),
            params![project, name, version as i64, spec, meta, expected as i64],
        ),
    }
    .with_context(|| format!("Failed to write {} '{}'", table, object_key(project, name)))?;

    if changed == 0 {
        return Err(Error::VersionConflict {
            key: object_key(project, name),
            expected: expected_version,
            actual: current_version(db, table, project, name)?,
        });
    }

    debug!(table, key = %object_key(project, name), version, "Wrote registry object");
    Ok(())
}

fn entity_from_raw((project, spec, meta): RawObject) -> Result<Entity> {
    Ok(Entity {
        project,
        spec: serde_json::from_str::<EntitySpec>(&spec)?,
        meta: serde_json::from_str::<ObjectMeta>(&meta)?,
    })
}

fn table_from_raw((project, spec, meta): RawObject) -> Result<FeatureTable> {
    Ok(FeatureTable {
        project,
        spec: serde_json::from_str::<FeatureTableSpec>(&spec)?,
        meta: serde_json::from_str::<ObjectMeta>(&meta)?,
    })
}

#[async_trait]
impl SpecStore for SqliteSpecStore {
    async fn init_schema(&self) -> Result<()> {
        let db = self.conn()?;
        schema::create_tables(&db)?;
        db.execute(
            "INSERT OR IGNORE INTO projects (name, archived, created_at) VALUES (?1, 0, ?2)",
            params![DEFAULT_PROJECT, format_ts(&Utc::now())],
        )
        .context("Failed to create default project")?;
        Ok(())
    }

    async fn get_project(&self, name: &str) -> Result<Option<Project>> {
        let db = self.conn()?;
        let raw: Option<(String, bool, String)> = db
            .query_row(
                "SELECT name, archived, created_at FROM projects WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .with_context(|| format!("Failed to read project '{}'", name))?;

        raw.map(|(name, archived, created_at)| project_from_row(name, archived, created_at))
            .transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare("SELECT name, archived, created_at FROM projects ORDER BY name")
            .context("Failed to prepare project query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to list projects")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read project row")?;

        rows.into_iter()
            .map(|(name, archived, created_at)| project_from_row(name, archived, created_at))
            .collect()
    }

    async fn create_project(&self, project: &Project) -> Result<bool> {
        let db = self.conn()?;
        let changed = db
            .execute(
                "INSERT OR IGNORE INTO projects (name, archived, created_at) VALUES (?1, ?2, ?3)",
                params![project.name, project.archived, format_ts(&project.created_at)],
            )
            .with_context(|| format!("Failed to create project '{}'", project.name))?;
        Ok(changed == 1)
    }

    async fn archive_project(&self, name: &str) -> Result<bool> {
        let db = self.conn()?;
        let changed = db
            .execute(
                "UPDATE projects SET archived = 1 WHERE name = ?1",
                params![name],
            )
            .with_context(|| format!("Failed to archive project '{}'", name))?;
        Ok(changed == 1)
    }

    async fn get_entity(&self, project: &str, name: &str) -> Result<Option<Entity>> {
        let raw = {
            let db = self.conn()?;
            get_raw(&db, ENTITIES, project, name)?
        };
        raw.map(entity_from_raw).transpose()
    }

    async fn list_entities(&self, project: &str) -> Result<Vec<Entity>> {
        let raw = {
            let db = self.conn()?;
            list_raw(&db, ENTITIES, project)?
        };
        raw.into_iter().map(entity_from_raw).collect()
    }

    async fn put_entity(&self, entity: &Entity, expected_version: Option<u64>) -> Result<()> {
        let spec = serde_json::to_string(&entity.spec)?;
        let meta = serde_json::to_string(&entity.meta)?;
        let db = self.conn()?;
        put_raw(
            &db,
            ENTITIES,
            &entity.project,
            &entity.spec.name,
            entity.meta.version,
            &spec,
            &meta,
            expected_version,
        )
    }

    async fn get_feature_table(&self, project: &str, name: &str) -> Result<Option<FeatureTable>> {
        let raw = {
            let db = self.conn()?;
            get_raw(&db, FEATURE_TABLES, project, name)?
        };
        raw.map(table_from_raw).transpose()
    }

    async fn list_feature_tables(&self, project: &str) -> Result<Vec<FeatureTable>> {
        let raw = {
            let db = self.conn()?;
            list_raw(&db, FEATURE_TABLES, project)?
        };
        raw.into_iter().map(table_from_raw).collect()
    }

    async fn put_feature_table(
        &self,
        table: &FeatureTable,
        expected_version: Option<u64>,
    ) -> Result<()> {
        let spec = serde_json::to_string(&table.spec)?;
        let meta = serde_json::to_string(&table.meta)?;
        let db = self.conn()?;
        put_raw(
            &db,
            FEATURE_TABLES,
            &table.project,
            &table.spec.name,
            table.meta.version,
            &spec,
            &meta,
            expected_version,
        )
    }

    async fn delete_feature_table(
        &self,
        project: &str,
        name: &str,
        expected_version: u64,
    ) -> Result<()> {
        let db = self.conn()?;
        let changed = db
            .execute(
                "DELETE FROM feature_tables WHERE project = ?1 AND name = ?2 AND version = ?3",
                params![project, name, expected_version as i64],
            )
            .with_context(|| {
                format!("Failed to delete feature table '{}'", object_key(project, name))
            })?;

        if changed == 0 {
            return Err(Error::VersionConflict {
                key: object_key(project, name),
                expected: Some(expected_version),
                actual: current_version(&db, FEATURE_TABLES, project, name)?,
            });
        }
        debug!(key = %object_key(project, name), "Deleted feature table");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let db = self.conn()?;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("SQLite registry health check failed")?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
