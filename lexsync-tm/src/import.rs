//! Import pipeline: validate, diff, back up, apply
//!
//! The apply step is one transaction; either every detected change lands or
//! none does. The pre-import backup is written before the transaction opens
//! and stays behind as recovery material even when the import succeeds.

use lexsync_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::archive::ArchiveClient;
use crate::db;
use crate::db::values::{NewValueRow, ValueUpdate};
use crate::diff::{self, ChangeSet, NewKey, NewValue, UpdatedValue};
use crate::export::ExportEngine;

/// Payload shape of a migration file or direct import request
#[derive(Debug, Clone, Deserialize)]
pub struct ImportPayload {
    #[serde(default)]
    pub interface: Option<String>,
    pub translations: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub update_existing_values: bool,
}

/// How an import run should behave
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub preview: bool,
    pub update_existing_values: bool,
}

/// Counts reported by a preview, keyed by bucket name
#[derive(Debug, Clone, Serialize)]
pub struct PreviewSummary {
    pub new_keys: usize,
    pub updated_values: usize,
    pub new_values: usize,
    pub unchanged: usize,
}

/// The buckets a preview exposes in full (unchanged stays a count)
#[derive(Debug, Clone, Serialize)]
pub struct PreviewChanges {
    pub new_keys: Vec<NewKey>,
    pub updated_values: Vec<UpdatedValue>,
    pub new_values: Vec<NewValue>,
}

/// Counts reported after an applied import
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub new_keys_created: usize,
    pub values_updated: usize,
    pub new_values_created: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImportOutcome {
    Preview {
        preview: bool,
        summary: PreviewSummary,
        changes: PreviewChanges,
    },
    Applied {
        success: bool,
        summary: ImportSummary,
    },
}

impl ImportOutcome {
    pub fn applied_summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportOutcome::Applied { summary, .. } => Some(summary),
            ImportOutcome::Preview { .. } => None,
        }
    }
}

/// Parse raw JSON into an import payload.
///
/// Export documents parse too: their extra metadata fields are ignored.
pub fn parse_payload(content: &str) -> Result<ImportPayload> {
    serde_json::from_str(content)
        .map_err(|e| Error::Validation(format!("invalid import payload: {}", e)))
}

#[derive(Clone)]
pub struct ImportPipeline {
    pool: SqlitePool,
    archive: ArchiveClient,
    export: ExportEngine,
}

impl ImportPipeline {
    pub fn new(pool: SqlitePool, archive: ArchiveClient, export: ExportEngine) -> Self {
        Self {
            pool,
            archive,
            export,
        }
    }

    /// Run an import against one interface.
    ///
    /// Preview mode classifies and returns without touching the store or the
    /// archive. Otherwise a pre-import backup is written first; a backup
    /// failure aborts before any relational write.
    pub async fn execute(
        &self,
        payload: &ImportPayload,
        interface: &str,
        options: ImportOptions,
    ) -> Result<ImportOutcome> {
        if let Some(declared) = &payload.interface {
            if declared != interface {
                return Err(Error::Validation(format!(
                    "payload interface {} does not match target interface {}",
                    declared, interface
                )));
            }
        }

        let existing = db::keys::load_keys_with_values(&self.pool, interface).await?;
        let mut changes = diff::detect_changes(&existing, &payload.translations);

        if options.preview {
            tracing::debug!(
                interface = %interface,
                new_keys = changes.new_keys.len(),
                updated_values = changes.updated_values.len(),
                new_values = changes.new_values.len(),
                "Import preview"
            );
            return Ok(ImportOutcome::Preview {
                preview: true,
                summary: PreviewSummary {
                    new_keys: changes.new_keys.len(),
                    updated_values: changes.updated_values.len(),
                    new_values: changes.new_values.len(),
                    unchanged: changes.unchanged.len(),
                },
                changes: PreviewChanges {
                    new_keys: changes.new_keys,
                    updated_values: changes.updated_values,
                    new_values: changes.new_values,
                },
            });
        }

        let update_existing = options.update_existing_values || payload.update_existing_values;
        if !update_existing {
            changes.keep_existing_values();
        }

        self.write_backup(interface).await?;
        self.apply_changes(&changes, interface, update_existing).await?;

        let summary = ImportSummary {
            new_keys_created: changes.new_keys.len(),
            values_updated: changes.updated_values.len(),
            new_values_created: changes.new_values.len(),
            unchanged: changes.unchanged.len(),
        };
        tracing::info!(
            interface = %interface,
            new_keys = summary.new_keys_created,
            updated = summary.values_updated,
            new_values = summary.new_values_created,
            unchanged = summary.unchanged,
            "Import applied"
        );
        Ok(ImportOutcome::Applied {
            success: true,
            summary,
        })
    }

    async fn write_backup(&self, interface: &str) -> Result<String> {
        let document = self.export.execute(interface, None).await?;
        let content = serde_json::to_string_pretty(&document)?;
        match self
            .archive
            .create_backup(interface, "before-import", &content, "json")
            .await
        {
            Ok(path) => Ok(path),
            Err(err @ Error::Backup(_)) => Err(err),
            Err(err) => Err(Error::Backup(err.to_string())),
        }
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        interface: &str,
        update_existing: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Repair both sequences up front so explicit-id rows written outside
        // this pipeline cannot collide with the inserts below
        db::values::resync_sequence(&mut tx, "translation_keys").await?;
        db::values::resync_sequence(&mut tx, "translation_values").await?;

        let mut rows: Vec<NewValueRow> = Vec::new();
        for new_key in &changes.new_keys {
            let (key_id, _created) = db::keys::ensure_key(
                &mut tx,
                &new_key.key,
                new_key.group.as_deref(),
                interface,
            )
            .await?;
            for (locale, value) in &new_key.locales {
                rows.push(NewValueRow {
                    translation_key_id: key_id,
                    locale: locale.clone(),
                    value: value.clone(),
                });
            }
        }
        if !changes.new_keys.is_empty() {
            db::values::resync_sequence(&mut tx, "translation_keys").await?;
        }

        for new_value in &changes.new_values {
            rows.push(NewValueRow {
                translation_key_id: new_value.key_id,
                locale: new_value.locale.clone(),
                value: new_value.value.clone(),
            });
        }
        if !rows.is_empty() {
            db::values::bulk_insert_values(&mut tx, &rows).await?;
            db::values::resync_sequence(&mut tx, "translation_values").await?;
        }

        if update_existing && !changes.updated_values.is_empty() {
            let updates: Vec<ValueUpdate> = changes
                .updated_values
                .iter()
                .map(|u| ValueUpdate {
                    translation_key_id: u.key_id,
                    locale: u.locale.clone(),
                    new_value: u.new_value.clone(),
                })
                .collect();
            db::values::bulk_update_values(&mut tx, &updates).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
