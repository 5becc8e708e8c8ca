//! Pulls untracked migration files from the archive into pending records

use lexsync_common::time::{compact_timestamp, Clock, SystemClock};
use lexsync_common::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::archive::{basename, sha256_hex, ArchiveClient};
use crate::db::migrations::{self, NewMigration};

/// Version token embedded in conforming filenames,
/// e.g. `mobile_2024-01-10_120000.json`
static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2}_\d{6})").expect("version pattern"));

fn extract_version(filename: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(filename)
        .map(|captures| captures[1].to_string())
}

#[derive(Clone)]
pub struct MigrationSync {
    pool: SqlitePool,
    archive: ArchiveClient,
    clock: Arc<dyn Clock>,
}

impl MigrationSync {
    pub fn new(pool: SqlitePool, archive: ArchiveClient) -> Self {
        Self::with_clock(pool, archive, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, archive: ArchiveClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            archive,
            clock,
        }
    }

    /// Track every archive migration file not yet known, returning how many
    /// were newly tracked.
    ///
    /// Each new record starts `pending` with provenance metadata; caller
    /// metadata wins on field collisions.
    pub async fn sync_interface(
        &self,
        interface: &str,
        extra_metadata: Option<&serde_json::Value>,
    ) -> Result<u64> {
        let files = self.archive.list_migration_files(interface).await?;
        let mut synced = 0;

        for path in files {
            let filename = basename(&path).to_string();
            if migrations::filename_exists(&self.pool, &filename).await? {
                continue;
            }

            let content = self.archive.download(&path).await?;
            let checksum = sha256_hex(&content);
            let version = extract_version(&filename)
                .unwrap_or_else(|| compact_timestamp(self.clock.now()));

            let mut metadata = json!({
                "s3_path": path,
                "synced_at": self.clock.now().to_rfc3339(),
                "synced_from_s3": true,
            });
            if let Some(serde_json::Value::Object(extra)) = extra_metadata {
                if let Some(base) = metadata.as_object_mut() {
                    for (key, value) in extra {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }

            migrations::insert_migration(
                &self.pool,
                &NewMigration {
                    filename: &filename,
                    interface_origin: interface,
                    version: &version,
                    checksum: &checksum,
                    metadata: Some(metadata),
                },
            )
            .await?;
            synced += 1;

            tracing::info!(
                interface = %interface,
                filename = %filename,
                version = %version,
                "Migration synced from archive"
            );
        }

        Ok(synced)
    }
}
