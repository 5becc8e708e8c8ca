//! Migration record queries

use super::parse_db_time;
use chrono::{DateTime, Utc};
use lexsync_common::models::{MigrationStatus, TranslationMigration};
use lexsync_common::{time, Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Fields of a migration about to be tracked
#[derive(Debug, Clone)]
pub struct NewMigration<'a> {
    pub filename: &'a str,
    pub interface_origin: &'a str,
    pub version: &'a str,
    pub checksum: &'a str,
    pub metadata: Option<serde_json::Value>,
}

/// Track a migration as pending; filenames are globally unique
pub async fn insert_migration(
    pool: &SqlitePool,
    new: &NewMigration<'_>,
) -> Result<TranslationMigration> {
    let now = time::now().to_rfc3339();
    let metadata_json = match &new.metadata {
        Some(value) => Some(serde_json::to_string(value)?),
        None => None,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO translation_migrations
            (filename, interface_origin, version, checksum, status, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(new.filename)
    .bind(new.interface_origin)
    .bind(new.version)
    .bind(new.checksum)
    .bind(&metadata_json)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
        {
            Error::Conflict(format!("migration already tracked: {}", new.filename))
        } else {
            Error::Persistence(e)
        }
    })?;

    let id = result.last_insert_rowid();
    find_migration(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("migration {} vanished after insert", id)))
}

pub async fn find_migration(pool: &SqlitePool, id: i64) -> Result<Option<TranslationMigration>> {
    let row = sqlx::query("SELECT * FROM translation_migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(map_row).transpose()
}

pub async fn find_by_filename(
    pool: &SqlitePool,
    filename: &str,
) -> Result<Option<TranslationMigration>> {
    let row = sqlx::query("SELECT * FROM translation_migrations WHERE filename = ?")
        .bind(filename)
        .fetch_optional(pool)
        .await?;
    row.map(map_row).transpose()
}

/// Whether a filename is already tracked, regardless of status
pub async fn filename_exists(pool: &SqlitePool, filename: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM translation_migrations WHERE filename = ?)")
            .bind(filename)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Pending migrations for an interface in tracking order
pub async fn pending_for_interface(
    pool: &SqlitePool,
    interface: &str,
) -> Result<Vec<TranslationMigration>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM translation_migrations
        WHERE interface_origin = ? AND status = 'pending'
        ORDER BY created_at, id
        "#,
    )
    .bind(interface)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(map_row).collect()
}

pub async fn count_pending(pool: &SqlitePool, interface: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM translation_migrations WHERE interface_origin = ? AND status = 'pending'",
    )
    .bind(interface)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Most recently applied completed migration for an interface
pub async fn latest_completed(
    pool: &SqlitePool,
    interface: &str,
) -> Result<Option<TranslationMigration>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM translation_migrations
        WHERE interface_origin = ? AND status = 'completed'
        ORDER BY applied_at DESC
        LIMIT 1
        "#,
    )
    .bind(interface)
    .fetch_optional(pool)
    .await?;
    row.map(map_row).transpose()
}

/// Next batch number: one past the highest assigned so far
pub async fn next_batch_number(pool: &SqlitePool) -> Result<i64> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(batch_number) FROM translation_migrations")
            .fetch_one(pool)
            .await?;
    Ok(max.unwrap_or(0) + 1)
}

pub async fn mark_processing(pool: &SqlitePool, id: i64) -> Result<()> {
    set_status(pool, id, MigrationStatus::Processing).await
}

async fn set_status(pool: &SqlitePool, id: i64, status: MigrationStatus) -> Result<()> {
    sqlx::query("UPDATE translation_migrations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(time::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Complete a migration: status, applied_at, batch number, metadata patch
pub async fn mark_completed(
    pool: &SqlitePool,
    id: i64,
    applied_at: DateTime<Utc>,
    batch_number: i64,
    patch: &serde_json::Value,
) -> Result<()> {
    let metadata = merged_metadata(pool, id, patch).await?;
    sqlx::query(
        r#"
        UPDATE translation_migrations
        SET status = 'completed', applied_at = ?, batch_number = ?, metadata = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(applied_at.to_rfc3339())
    .bind(batch_number)
    .bind(serde_json::to_string(&metadata)?)
    .bind(time::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, id: i64, patch: &serde_json::Value) -> Result<()> {
    let metadata = merged_metadata(pool, id, patch).await?;
    sqlx::query(
        "UPDATE translation_migrations SET status = 'failed', metadata = ?, updated_at = ? WHERE id = ?",
    )
    .bind(serde_json::to_string(&metadata)?)
    .bind(time::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_rolled_back(pool: &SqlitePool, id: i64, patch: &serde_json::Value) -> Result<()> {
    let metadata = merged_metadata(pool, id, patch).await?;
    sqlx::query(
        "UPDATE translation_migrations SET status = 'rolled_back', metadata = ?, updated_at = ? WHERE id = ?",
    )
    .bind(serde_json::to_string(&metadata)?)
    .bind(time::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Merge a JSON object patch into a migration's metadata
pub async fn merge_metadata(pool: &SqlitePool, id: i64, patch: &serde_json::Value) -> Result<()> {
    let metadata = merged_metadata(pool, id, patch).await?;
    sqlx::query("UPDATE translation_migrations SET metadata = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&metadata)?)
        .bind(time::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn merged_metadata(
    pool: &SqlitePool,
    id: i64,
    patch: &serde_json::Value,
) -> Result<serde_json::Value> {
    let migration = find_migration(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("migration {} not found", id)))?;

    let mut merged = match migration.metadata {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(updates) = patch {
        for (key, value) in updates {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::Value::Object(merged))
}

fn map_row(row: SqliteRow) -> Result<TranslationMigration> {
    let status_raw: String = row.get("status");
    let metadata_raw: Option<String> = row.get("metadata");
    let applied_raw: Option<String> = row.get("applied_at");
    let created_raw: String = row.get("created_at");
    let updated_raw: String = row.get("updated_at");

    Ok(TranslationMigration {
        id: row.get("id"),
        filename: row.get("filename"),
        interface_origin: row.get("interface_origin"),
        version: row.get("version"),
        checksum: row.get("checksum"),
        status: status_raw.parse()?,
        batch_number: row.get("batch_number"),
        metadata: metadata_raw
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        applied_at: applied_raw
            .map(|raw| parse_db_time(&raw))
            .transpose()?,
        created_at: parse_db_time(&created_raw)?,
        updated_at: parse_db_time(&updated_raw)?,
    })
}
