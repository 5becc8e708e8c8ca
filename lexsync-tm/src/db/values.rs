//! Translation value bulk operations

use lexsync_common::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Rows per multi-row statement; 5 binds per row stays well under SQLite's
/// bind-parameter limit
const BIND_CHUNK: usize = 100;

/// Row queued for insertion
#[derive(Debug, Clone)]
pub struct NewValueRow {
    pub translation_key_id: i64,
    pub locale: String,
    pub value: String,
}

/// One (key, locale) pair's replacement text
#[derive(Debug, Clone)]
pub struct ValueUpdate {
    pub translation_key_id: i64,
    pub locale: String,
    pub new_value: String,
}

/// Insert rows in bulk, skipping (key, locale) pairs that already exist.
/// Returns the number of rows actually inserted.
pub async fn bulk_insert_values(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[NewValueRow],
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(BIND_CHUNK) {
        let mut sql = String::from(
            "INSERT INTO translation_values (translation_key_id, locale, value) VALUES ",
        );
        sql.push_str(&vec!["(?, ?, ?)"; chunk.len()].join(", "));
        sql.push_str(" ON CONFLICT(translation_key_id, locale) DO NOTHING");

        let mut query = sqlx::query(&sql);
        for row in chunk {
            query = query
                .bind(row.translation_key_id)
                .bind(&row.locale)
                .bind(&row.value);
        }
        inserted += query.execute(&mut **tx).await?.rows_affected();
    }
    Ok(inserted)
}

/// Update existing rows in bulk via CASE dispatch; one statement per chunk
/// is semantically one UPDATE per (key, locale) pair.
pub async fn bulk_update_values(
    tx: &mut Transaction<'_, Sqlite>,
    updates: &[ValueUpdate],
) -> Result<u64> {
    let mut updated = 0;
    for chunk in updates.chunks(BIND_CHUNK) {
        let mut sql = String::from("UPDATE translation_values SET value = CASE ");
        for _ in chunk {
            sql.push_str("WHEN translation_key_id = ? AND locale = ? THEN ? ");
        }
        sql.push_str("ELSE value END, updated_at = CURRENT_TIMESTAMP WHERE ");
        sql.push_str(&vec!["(translation_key_id = ? AND locale = ?)"; chunk.len()].join(" OR "));

        let mut query = sqlx::query(&sql);
        for update in chunk {
            query = query
                .bind(update.translation_key_id)
                .bind(&update.locale)
                .bind(&update.new_value);
        }
        for update in chunk {
            query = query.bind(update.translation_key_id).bind(&update.locale);
        }
        updated += query.execute(&mut **tx).await?.rows_affected();
    }
    Ok(updated)
}

/// Repair sqlite_sequence so future autoincrement ids follow MAX(id)
///
/// Idempotent; guards against rows inserted with explicit ids by fixtures
/// or external writers. No-op before the first autoincrement insert ever.
pub async fn resync_sequence(tx: &mut Transaction<'_, Sqlite>, table: &str) -> Result<()> {
    let sequence_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence')",
    )
    .fetch_one(&mut **tx)
    .await?;
    if !sequence_exists {
        return Ok(());
    }

    // Internal callers pass fixed table names, never user input
    let sql = format!(
        "UPDATE sqlite_sequence SET seq = (SELECT COALESCE(MAX(id), 0) FROM {table}) WHERE name = '{table}'",
        table = table
    );
    sqlx::query(&sql).execute(&mut **tx).await?;
    Ok(())
}
