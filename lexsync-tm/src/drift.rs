//! Divergence detection between the archive and local migration files

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_common::{time, Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{basename, sha256_hex, ArchiveClient};

/// The local side of the comparison: filename to content checksum
#[async_trait]
pub trait LocalFileSource: Send + Sync {
    async fn checksums(&self, interface: &str) -> Result<BTreeMap<String, String>>;
}

/// Local migration files under `{root}/{interface}/`
pub struct FsLocalFiles {
    root: PathBuf,
}

impl FsLocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl LocalFileSource for FsLocalFiles {
    async fn checksums(&self, interface: &str) -> Result<BTreeMap<String, String>> {
        let dir = self.root.join(interface);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut checksums = BTreeMap::new();
        while let Some(entry) = reader.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            checksums.insert(
                entry.file_name().to_string_lossy().into_owned(),
                sha256_hex(&content),
            );
        }
        Ok(checksums)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecksumMismatch {
    pub filename: String,
    pub s3_checksum: String,
    pub local_checksum: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDrift {
    pub interface: String,
    pub has_drift: bool,
    pub missing_in_local: Vec<String>,
    pub missing_in_s3: Vec<String>,
    pub checksum_mismatches: Vec<ChecksumMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub checked_at: DateTime<Utc>,
    pub has_drift: bool,
    pub interfaces: Vec<InterfaceDrift>,
}

pub struct DriftDetector {
    archive: ArchiveClient,
    local: Arc<dyn LocalFileSource>,
    interfaces: Vec<String>,
}

impl DriftDetector {
    pub fn new(
        archive: ArchiveClient,
        local: Arc<dyn LocalFileSource>,
        interfaces: Vec<String>,
    ) -> Self {
        Self {
            archive,
            local,
            interfaces,
        }
    }

    /// Compare archive and local state for one interface or all of them.
    ///
    /// An interface whose comparison fails yields a non-drifting entry with
    /// the error recorded; the remaining interfaces still get checked.
    pub async fn execute(&self, interface: Option<&str>) -> DriftReport {
        let targets: Vec<String> = match interface {
            Some(one) => vec![one.to_string()],
            None => self.interfaces.clone(),
        };

        let mut entries = Vec::with_capacity(targets.len());
        for target in &targets {
            let entry = match self.check_interface(target).await {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::error!(
                        interface = %target,
                        error = %err,
                        "Drift check failed for interface"
                    );
                    InterfaceDrift {
                        interface: target.clone(),
                        has_drift: false,
                        missing_in_local: Vec::new(),
                        missing_in_s3: Vec::new(),
                        checksum_mismatches: Vec::new(),
                        error: Some(err.to_string()),
                    }
                }
            };
            entries.push(entry);
        }

        let report = DriftReport {
            checked_at: time::now(),
            has_drift: entries.iter().any(|e| e.has_drift),
            interfaces: entries,
        };
        tracing::info!(has_drift = report.has_drift, "Drift check finished");
        report
    }

    async fn check_interface(&self, interface: &str) -> Result<InterfaceDrift> {
        let archive_paths = self.archive.list_migration_files(interface).await?;
        let local = self.local.checksums(interface).await?;

        let mut missing_in_local = Vec::new();
        let mut checksum_mismatches = Vec::new();
        let mut archive_names = Vec::with_capacity(archive_paths.len());

        for path in &archive_paths {
            let filename = basename(path).to_string();
            match local.get(&filename) {
                None => missing_in_local.push(filename.clone()),
                Some(local_checksum) => {
                    let s3_checksum = self.archive.get_file_checksum(path).await?;
                    if &s3_checksum != local_checksum {
                        checksum_mismatches.push(ChecksumMismatch {
                            filename: filename.clone(),
                            s3_checksum,
                            local_checksum: local_checksum.clone(),
                        });
                    }
                }
            }
            archive_names.push(filename);
        }

        let missing_in_s3: Vec<String> = local
            .keys()
            .filter(|name| !archive_names.contains(*name))
            .cloned()
            .collect();

        let has_drift = !missing_in_local.is_empty()
            || !missing_in_s3.is_empty()
            || !checksum_mismatches.is_empty();
        if has_drift {
            tracing::warn!(
                interface = %interface,
                missing_in_local = missing_in_local.len(),
                missing_in_s3 = missing_in_s3.len(),
                checksum_mismatches = checksum_mismatches.len(),
                "Drift detected"
            );
        }

        Ok(InterfaceDrift {
            interface: interface.to_string(),
            has_drift,
            missing_in_local,
            missing_in_s3,
            checksum_mismatches,
            error: None,
        })
    }
}
