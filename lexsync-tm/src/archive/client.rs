//! Archive client: migration files, backups, manifest

use super::{backup_prefix, basename, migration_path, migration_prefix, MANIFEST_FILENAME};
use super::store::ArchiveStore;
use chrono::{DateTime, Utc};
use lexsync_common::time::{compact_timestamp, Clock, SystemClock};
use lexsync_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// `migrations/{interface}/manifest.json`
///
/// Written by the publishing side; LexSync reads `updated_at` for the
/// freshness health check and preserves whatever else is in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// SHA-256 hex digest of content, as stored on migration records
pub fn sha256_hex(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// High-level archive operations over a backing store
#[derive(Clone)]
pub struct ArchiveClient {
    store: Arc<dyn ArchiveStore>,
    clock: Arc<dyn Clock>,
}

impl ArchiveClient {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Client with an injected clock; backup filenames embed its reading
    pub fn with_clock(store: Arc<dyn ArchiveStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Migration files for an interface, sorted, manifest excluded
    pub async fn list_migration_files(&self, interface: &str) -> Result<Vec<String>> {
        let mut files = self.store.list(&migration_prefix(interface)).await?;
        files.retain(|path| basename(path) != MANIFEST_FILENAME);
        Ok(files)
    }

    pub async fn migration_file_exists(&self, interface: &str, filename: &str) -> Result<bool> {
        self.store.exists(&migration_path(interface, filename)).await
    }

    /// Content of one migration file; NotFound when absent
    pub async fn download_migration_file(&self, interface: &str, filename: &str) -> Result<String> {
        let path = migration_path(interface, filename);
        tracing::debug!(path = %path, "Downloading migration file");
        self.store.get(&path).await
    }

    /// Write a migration file and return its archive path
    pub async fn upload_migration_file(
        &self,
        interface: &str,
        filename: &str,
        content: &str,
    ) -> Result<String> {
        let path = migration_path(interface, filename);
        self.store.put(&path, content).await?;
        tracing::info!(path = %path, bytes = content.len(), "Uploaded migration file");
        Ok(path)
    }

    /// SHA-256 of an object's current content
    pub async fn get_file_checksum(&self, path: &str) -> Result<String> {
        let content = self.store.get(path).await?;
        Ok(sha256_hex(&content))
    }

    /// Write a timestamped backup artifact and return its path
    ///
    /// Naming: `{interface}_{operation}_{YYYY-MM-DD_HHMMSS}.{format}` under
    /// `backups/{interface}/`. Backups never overwrite.
    pub async fn create_backup(
        &self,
        interface: &str,
        operation: &str,
        content: &str,
        format: &str,
    ) -> Result<String> {
        let stamp = compact_timestamp(self.clock.now());
        let path = format!(
            "{}{}_{}_{}.{}",
            backup_prefix(interface),
            interface,
            operation,
            stamp,
            format
        );

        if self.store.exists(&path).await? {
            return Err(Error::Backup(format!("backup already exists: {}", path)));
        }
        self.store.put(&path, content).await?;

        tracing::info!(path = %path, "Backup written");
        Ok(path)
    }

    /// Backup artifacts for an interface, sorted ascending
    pub async fn list_backup_files(&self, interface: &str) -> Result<Vec<String>> {
        self.store.list(&backup_prefix(interface)).await
    }

    /// Most recent backup path, None when the interface has none.
    /// Timestamped names sort, so the greatest path is the newest.
    pub async fn latest_backup(&self, interface: &str) -> Result<Option<String>> {
        let files = self.list_backup_files(interface).await?;
        Ok(files.into_iter().next_back())
    }

    /// Read an archive object by full path
    pub async fn download(&self, path: &str) -> Result<String> {
        self.store.get(path).await
    }

    /// Interface manifest; None when the archive has none
    pub async fn get_manifest(&self, interface: &str) -> Result<Option<Manifest>> {
        let path = migration_path(interface, MANIFEST_FILENAME);
        if !self.store.exists(&path).await? {
            return Ok(None);
        }
        let content = self.store.get(&path).await?;
        let manifest = serde_json::from_str(&content)?;
        Ok(Some(manifest))
    }

    pub async fn update_manifest(&self, interface: &str, manifest: &Manifest) -> Result<()> {
        let path = migration_path(interface, MANIFEST_FILENAME);
        let content = serde_json::to_string_pretty(manifest)?;
        self.store.put(&path, &content).await?;
        tracing::debug!(path = %path, "Manifest updated");
        Ok(())
    }
}
