//! Database initialization
//!
//! Creates the connection pool and the translation schema. All statements
//! are idempotent so startup is safe against an existing database.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Pinned to a single connection: every new in-memory connection would
/// otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_tables(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_translation_keys_table(pool).await?;
    create_translation_values_table(pool).await?;
    create_translation_migrations_table(pool).await?;
    Ok(())
}

/// Create the translation_keys table
///
/// `"group"` is stored as '' for ungrouped keys: SQL NULLs compare distinct
/// inside UNIQUE constraints, which would let duplicate ungrouped keys in.
pub async fn create_translation_keys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translation_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            "group" TEXT NOT NULL DEFAULT '',
            interface_origin TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (key, "group", interface_origin)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_translation_keys_interface ON translation_keys(interface_origin)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the translation_values table
pub async fn create_translation_values_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translation_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            translation_key_id INTEGER NOT NULL REFERENCES translation_keys(id) ON DELETE CASCADE,
            locale TEXT NOT NULL,
            value TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (translation_key_id, locale)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the translation_migrations table
pub async fn create_translation_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translation_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            interface_origin TEXT NOT NULL,
            version TEXT NOT NULL,
            checksum TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed', 'rolled_back')),
            batch_number INTEGER,
            metadata TEXT,
            applied_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_translation_migrations_interface_status ON translation_migrations(interface_origin, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
