//! Metadata store schema
//!
//! Idempotent table creation, run once when the pool is opened. Natural keys
//! double as primary keys so upserts can use `ON CONFLICT ... DO UPDATE`.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sobjects (
        name TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        label_plural TEXT,
        key_prefix TEXT,
        createable INTEGER NOT NULL DEFAULT 0,
        updateable INTEGER NOT NULL DEFAULT 0,
        deletable INTEGER NOT NULL DEFAULT 0,
        queryable INTEGER NOT NULL DEFAULT 0,
        searchable INTEGER NOT NULL DEFAULT 0,
        synced_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS fields (
        sobject TEXT NOT NULL,
        name TEXT NOT NULL,
        label TEXT NOT NULL,
        field_type TEXT NOT NULL,
        length INTEGER,
        precision INTEGER,
        scale INTEGER,
        nillable INTEGER NOT NULL DEFAULT 1,
        is_unique INTEGER NOT NULL DEFAULT 0,
        auto_number INTEGER NOT NULL DEFAULT 0,
        calculated INTEGER NOT NULL DEFAULT 0,
        default_value TEXT,
        picklist_values TEXT NOT NULL DEFAULT '[]',
        reference_to TEXT NOT NULL DEFAULT '[]',
        relationship_name TEXT,
        PRIMARY KEY (sobject, name)
    )",
    "CREATE TABLE IF NOT EXISTS relationships (
        from_sobject TEXT NOT NULL,
        field TEXT NOT NULL,
        to_sobject TEXT NOT NULL,
        relationship_name TEXT,
        kind TEXT NOT NULL DEFAULT 'lookup',
        cascade_delete INTEGER NOT NULL DEFAULT 0,
        restrict_delete INTEGER NOT NULL DEFAULT 0,
        required INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (from_sobject, field)
    )",
    "CREATE TABLE IF NOT EXISTS validation_rules (
        sobject TEXT NOT NULL,
        name TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        error_message TEXT NOT NULL,
        error_display_field TEXT,
        description TEXT,
        PRIMARY KEY (sobject, name)
    )",
    "CREATE INDEX IF NOT EXISTS idx_fields_sobject ON fields(sobject)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_sobject)",
    "CREATE INDEX IF NOT EXISTS idx_validation_rules_sobject ON validation_rules(sobject)",
];

/// Create the metadata tables if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to run metadata schema migration")?;
    }
    Ok(())
}
