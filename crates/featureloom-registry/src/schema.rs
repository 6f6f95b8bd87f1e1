//! Database schema for the SQLite spec store
//!
//! # Tables
//!
//! - **projects**: namespaces, with archive flag
//! - **entities**: one row per `(project, name)`
//! - **feature_tables**: one row per `(project, name)`
//!
//! # Design Decisions
//!
//! - JSON columns for spec and meta: the spec model evolves without migrations
//! - A plain `version` column next to the JSON: compare-and-swap is a single
//!   `UPDATE ... WHERE version = ?`

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn create_tables(db: &Connection) -> Result<()> {
    db.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            name TEXT PRIMARY KEY,
            archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            spec TEXT NOT NULL,
            meta TEXT NOT NULL,
            PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS feature_tables (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            spec TEXT NOT NULL,
            meta TEXT NOT NULL,
            PRIMARY KEY (project, name)
        );
        "#,
    )
    .context("Failed to create registry tables")?;

    Ok(())
}
