//! Applies tracked migrations and restores interfaces from backups
//!
//! Status bookkeeping happens outside the import's transaction so a failed
//! apply still leaves a `failed` record with the error in its metadata.

use lexsync_common::models::TranslationMigration;
use lexsync_common::{time, Error, Result};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::archive::ArchiveClient;
use crate::db::migrations;
use crate::export::ExportEngine;
use crate::import::{parse_payload, ImportOptions, ImportPipeline, ImportSummary};

/// How a single migration application should behave
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub create_backup: bool,
    pub validate_checksum: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            validate_checksum: true,
        }
    }
}

/// Outcome of applying one migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub migration_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl MigrationResult {
    fn success(migration_id: i64, backup_path: Option<String>, metadata: serde_json::Value) -> Self {
        Self {
            migration_id,
            success: true,
            backup_path,
            error: None,
            metadata,
        }
    }

    fn failure(migration_id: i64, error: &str, metadata: serde_json::Value) -> Self {
        Self {
            migration_id,
            success: false,
            backup_path: None,
            error: Some(error.to_string()),
            metadata,
        }
    }
}

/// Outcome of restoring an interface from its latest backup
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub interface: String,
    pub restored_from: String,
    pub summary: ImportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_migration_id: Option<i64>,
}

#[derive(Clone)]
pub struct MigrationApplier {
    pool: SqlitePool,
    archive: ArchiveClient,
    import: ImportPipeline,
    export: ExportEngine,
}

impl MigrationApplier {
    pub fn new(
        pool: SqlitePool,
        archive: ArchiveClient,
        import: ImportPipeline,
        export: ExportEngine,
    ) -> Self {
        Self {
            pool,
            archive,
            import,
            export,
        }
    }

    /// Apply one tracked migration end to end.
    ///
    /// A checksum mismatch or import failure marks the record `failed` and
    /// returns a failure result rather than an error; errors are reserved
    /// for conditions where no verdict was reached (unknown id, store down).
    pub async fn execute(&self, migration_id: i64, options: ApplyOptions) -> Result<MigrationResult> {
        let migration = migrations::find_migration(&self.pool, migration_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("migration {} not found", migration_id)))?;

        tracing::info!(
            migration_id = migration.id,
            filename = %migration.filename,
            interface = %migration.interface_origin,
            "Applying migration"
        );

        if options.validate_checksum {
            let actual = self
                .archive
                .get_file_checksum(&migration.archive_path())
                .await?;
            if actual != migration.checksum {
                let error = "checksum validation failed for migration";
                migrations::mark_failed(
                    &self.pool,
                    migration.id,
                    &json!({
                        "error": error,
                        "failed_at": time::now().to_rfc3339(),
                    }),
                )
                .await?;
                tracing::error!(
                    migration_id = migration.id,
                    filename = %migration.filename,
                    expected = %migration.checksum,
                    actual = %actual,
                    "Checksum validation failed"
                );
                return Ok(MigrationResult::failure(
                    migration.id,
                    error,
                    json!({
                        "filename": migration.filename,
                        "interface": migration.interface_origin,
                        "validation_type": "checksum",
                        "checksum_expected": migration.checksum,
                    }),
                ));
            }
        }

        let mut backup_path = None;
        if options.create_backup {
            let document = self.export.execute(&migration.interface_origin, None).await?;
            let content = serde_json::to_string_pretty(&document)?;
            let path = self
                .archive
                .create_backup(
                    &migration.interface_origin,
                    "before-apply-migration",
                    &content,
                    "json",
                )
                .await?;
            migrations::merge_metadata(&self.pool, migration.id, &json!({"backup_path": path}))
                .await?;
            backup_path = Some(path);
        }

        match self.apply_inner(&migration).await {
            Ok(summary) => {
                let batch_number = match migration.batch_number {
                    Some(existing) => existing,
                    None => migrations::next_batch_number(&self.pool).await?,
                };
                let applied_at = time::now();
                migrations::mark_completed(
                    &self.pool,
                    migration.id,
                    applied_at,
                    batch_number,
                    &json!({
                        "summary": summary,
                        "applied_at": applied_at.to_rfc3339(),
                    }),
                )
                .await?;
                tracing::info!(
                    migration_id = migration.id,
                    filename = %migration.filename,
                    batch_number,
                    "Migration applied"
                );
                Ok(MigrationResult::success(
                    migration.id,
                    backup_path,
                    json!({
                        "interface": migration.interface_origin,
                        "version": migration.version,
                    }),
                ))
            }
            Err(err) => {
                let message = err.to_string();
                migrations::mark_failed(
                    &self.pool,
                    migration.id,
                    &json!({
                        "error": message,
                        "failed_at": time::now().to_rfc3339(),
                    }),
                )
                .await?;
                tracing::error!(
                    migration_id = migration.id,
                    filename = %migration.filename,
                    error = %message,
                    "Migration failed"
                );
                Ok(MigrationResult::failure(
                    migration.id,
                    &message,
                    json!({
                        "filename": migration.filename,
                        "interface": migration.interface_origin,
                    }),
                ))
            }
        }
    }

    async fn apply_inner(&self, migration: &TranslationMigration) -> Result<ImportSummary> {
        migrations::mark_processing(&self.pool, migration.id).await?;

        let content = self
            .archive
            .download_migration_file(&migration.interface_origin, &migration.filename)
            .await?;
        let payload = parse_payload(&content)?;
        if payload.translations.is_empty() {
            return Err(Error::Validation(
                "migration file does not contain translations".into(),
            ));
        }

        let outcome = self
            .import
            .execute(
                &payload,
                &migration.interface_origin,
                ImportOptions {
                    preview: false,
                    update_existing_values: true,
                },
            )
            .await?;
        outcome
            .applied_summary()
            .cloned()
            .ok_or_else(|| Error::Internal("import returned a preview outcome".into()))
    }

    /// Restore an interface from its most recent backup artifact.
    ///
    /// The pre-rollback state is backed up first, so a rollback can itself
    /// be rolled back. The newest completed migration for the interface, if
    /// any, is marked `rolled_back`.
    pub async fn rollback(&self, interface: &str) -> Result<RollbackResult> {
        let backup_path = self
            .archive
            .latest_backup(interface)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no backup found for interface {}", interface)))?;

        let content = self.archive.download(&backup_path).await?;
        let payload = parse_payload(&content)?;

        let document = self.export.execute(interface, None).await?;
        let snapshot = serde_json::to_string_pretty(&document)?;
        self.archive
            .create_backup(interface, "before-rollback", &snapshot, "json")
            .await?;

        let outcome = self
            .import
            .execute(
                &payload,
                interface,
                ImportOptions {
                    preview: false,
                    update_existing_values: true,
                },
            )
            .await?;
        let summary = outcome
            .applied_summary()
            .cloned()
            .ok_or_else(|| Error::Internal("import returned a preview outcome".into()))?;

        let rolled_back = migrations::latest_completed(&self.pool, interface).await?;
        if let Some(migration) = &rolled_back {
            migrations::mark_rolled_back(
                &self.pool,
                migration.id,
                &json!({
                    "restored_from": backup_path,
                    "rolled_back_at": time::now().to_rfc3339(),
                }),
            )
            .await?;
        }

        tracing::info!(
            interface = %interface,
            restored_from = %backup_path,
            "Interface rolled back"
        );
        Ok(RollbackResult {
            interface: interface.to_string(),
            restored_from: backup_path,
            summary,
            rolled_back_migration_id: rolled_back.map(|m| m.id),
        })
    }
}
