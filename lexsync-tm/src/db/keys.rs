//! Translation key queries

use super::{group_from_db, group_to_db, parse_db_time};
use lexsync_common::models::{KeyWithValues, TranslationKey};
use lexsync_common::Result;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

/// Load every key for an interface with its locale/value rows
pub async fn load_keys_with_values(
    pool: &SqlitePool,
    interface: &str,
) -> Result<Vec<KeyWithValues>> {
    let rows = sqlx::query(
        r#"
        SELECT k.id, k.key, k."group", v.locale, v.value
        FROM translation_keys k
        LEFT JOIN translation_values v ON v.translation_key_id = k.id
        WHERE k.interface_origin = ?
        ORDER BY k.id, v.locale
        "#,
    )
    .bind(interface)
    .fetch_all(pool)
    .await?;

    let mut keys: Vec<KeyWithValues> = Vec::new();
    for row in rows {
        let id: i64 = row.get("id");
        if keys.last().map(|k| k.id) != Some(id) {
            keys.push(KeyWithValues {
                id,
                key: row.get("key"),
                group: group_from_db(row.get("group")),
                values: Default::default(),
            });
        }
        let locale: Option<String> = row.get("locale");
        if let Some(locale) = locale {
            let value: String = row.get("value");
            if let Some(current) = keys.last_mut() {
                current.values.insert(locale, value);
            }
        }
    }

    Ok(keys)
}

/// Insert the key if absent and return (id, inserted)
///
/// Races to create the same key resolve through the UNIQUE constraint: the
/// loser's insert is a no-op and the follow-up select returns the winner's
/// row.
pub async fn ensure_key(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    group: Option<&str>,
    interface: &str,
) -> Result<(i64, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO translation_keys (key, "group", interface_origin)
        VALUES (?, ?, ?)
        ON CONFLICT(key, "group", interface_origin) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(group_to_db(group))
    .bind(interface)
    .execute(&mut **tx)
    .await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        SELECT id FROM translation_keys
        WHERE key = ? AND "group" = ? AND interface_origin = ?
        "#,
    )
    .bind(key)
    .bind(group_to_db(group))
    .bind(interface)
    .fetch_one(&mut **tx)
    .await?;

    Ok((id, result.rows_affected() > 0))
}

/// Look up one key by its identity triple
pub async fn find_key(
    pool: &SqlitePool,
    key: &str,
    group: Option<&str>,
    interface: &str,
) -> Result<Option<TranslationKey>> {
    let row = sqlx::query(
        r#"
        SELECT id, key, "group", interface_origin, created_at, updated_at
        FROM translation_keys
        WHERE key = ? AND "group" = ? AND interface_origin = ?
        "#,
    )
    .bind(key)
    .bind(group_to_db(group))
    .bind(interface)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let created_raw: String = row.get("created_at");
            let updated_raw: String = row.get("updated_at");
            Ok(Some(TranslationKey {
                id: row.get("id"),
                key: row.get("key"),
                group: group_from_db(row.get("group")),
                interface_origin: row.get("interface_origin"),
                created_at: parse_db_time(&created_raw)?,
                updated_at: parse_db_time(&updated_raw)?,
            }))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_common::db::init_memory_database;

    #[tokio::test]
    async fn test_ensure_key_inserts_then_reuses() {
        let pool = init_memory_database().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let (first_id, inserted) = ensure_key(&mut tx, "title", Some("auth"), "mobile")
            .await
            .unwrap();
        assert!(inserted);

        let (second_id, inserted) = ensure_key(&mut tx, "title", Some("auth"), "mobile")
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(first_id, second_id);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_key_ungrouped_uses_empty_encoding() {
        let pool = init_memory_database().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let (_, inserted) = ensure_key(&mut tx, "welcome", None, "mobile").await.unwrap();
        assert!(inserted);
        let (_, inserted) = ensure_key(&mut tx, "welcome", None, "mobile").await.unwrap();
        assert!(!inserted);
        tx.commit().await.unwrap();

        let key = find_key(&pool, "welcome", None, "mobile")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.group, None);
        assert_eq!(key.full_key(), "welcome");
    }

    #[tokio::test]
    async fn test_load_keys_with_values_folds_rows() {
        let pool = init_memory_database().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let (id, _) = ensure_key(&mut tx, "title", Some("auth"), "mobile")
            .await
            .unwrap();
        let (bare_id, _) = ensure_key(&mut tx, "welcome", None, "mobile").await.unwrap();
        sqlx::query(
            "INSERT INTO translation_values (translation_key_id, locale, value) VALUES (?, 'en-GB', 'Sign in'), (?, 'fr-FR', 'Connexion')",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let keys = load_keys_with_values(&pool, "mobile").await.unwrap();
        assert_eq!(keys.len(), 2);

        let grouped = keys.iter().find(|k| k.id == id).unwrap();
        assert_eq!(grouped.full_key(), "auth.title");
        assert_eq!(grouped.values.len(), 2);
        assert_eq!(grouped.values["en-GB"], "Sign in");

        let bare = keys.iter().find(|k| k.id == bare_id).unwrap();
        assert!(bare.values.is_empty());
    }

    #[tokio::test]
    async fn test_other_interface_not_loaded() {
        let pool = init_memory_database().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        ensure_key(&mut tx, "title", Some("auth"), "mobile").await.unwrap();
        ensure_key(&mut tx, "title", Some("auth"), "web_financer")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let keys = load_keys_with_values(&pool, "mobile").await.unwrap();
        assert_eq!(keys.len(), 1);
    }
}
