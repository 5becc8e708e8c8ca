//! Scheduled reconciliation: sync the archive, dispatch processing jobs
//!
//! Interface failures are caught and reported per entry, never aborting the
//! run. The cooldown cache lives in process memory; a restart simply allows
//! an immediate reconciliation.

use chrono::{DateTime, Duration, Utc};
use lexsync_common::config::Config;
use lexsync_common::{time, Result};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::migrations;
use crate::jobs::{JobQueue, ProcessMigrationJob};
use crate::sync::MigrationSync;

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Interfaces to reconcile; defaults to the configured set
    pub interfaces: Option<Vec<String>>,
    /// Bypass the cooldown window
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceReconciliation {
    pub interface: String,
    pub files_synced: u64,
    pub jobs_dispatched: u64,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub interfaces: Vec<InterfaceReconciliation>,
    pub total_files_synced: u64,
    pub total_jobs_dispatched: u64,
}

pub struct ReconcileScheduler {
    pool: SqlitePool,
    sync: MigrationSync,
    queue: Arc<dyn JobQueue>,
    interfaces: Vec<String>,
    queue_name: String,
    cooldown: Duration,
    last_run: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ReconcileScheduler {
    pub fn new(
        pool: SqlitePool,
        sync: MigrationSync,
        queue: Arc<dyn JobQueue>,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            sync,
            queue,
            interfaces: config.interfaces.clone(),
            queue_name: config.queue_name.clone(),
            cooldown: Duration::seconds(config.reconcile_cooldown_secs as i64),
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile the requested interfaces and report what happened.
    ///
    /// `success` is true only when no interface entry carries an error;
    /// skipped interfaces do not count against it.
    pub async fn execute(&self, options: &ReconcileOptions) -> ReconciliationReport {
        let run_id = Uuid::new_v4();
        let started_at = time::now();
        let targets = options
            .interfaces
            .clone()
            .unwrap_or_else(|| self.interfaces.clone());

        tracing::info!(
            run_id = %run_id,
            interfaces = ?targets,
            force = options.force,
            "Reconciliation run started"
        );

        let mut entries = Vec::with_capacity(targets.len());
        for interface in &targets {
            entries.push(self.reconcile_interface(interface, run_id, options.force).await);
        }

        let success = entries.iter().all(|e| e.error.is_none());
        let report = ReconciliationReport {
            run_id,
            started_at,
            completed_at: time::now(),
            success,
            total_files_synced: entries.iter().map(|e| e.files_synced).sum(),
            total_jobs_dispatched: entries.iter().map(|e| e.jobs_dispatched).sum(),
            interfaces: entries,
        };
        tracing::info!(
            run_id = %run_id,
            success = report.success,
            files_synced = report.total_files_synced,
            jobs_dispatched = report.total_jobs_dispatched,
            "Reconciliation run finished"
        );
        report
    }

    async fn reconcile_interface(
        &self,
        interface: &str,
        run_id: Uuid,
        force: bool,
    ) -> InterfaceReconciliation {
        if !force {
            let last_run = self.last_run.lock().await;
            if let Some(last) = last_run.get(interface) {
                if time::now() - *last < self.cooldown {
                    tracing::debug!(interface = %interface, "Reconciled recently, skipping");
                    return InterfaceReconciliation {
                        interface: interface.to_string(),
                        files_synced: 0,
                        jobs_dispatched: 0,
                        skipped: true,
                        error: None,
                    };
                }
            }
        }

        match self.sync_and_dispatch(interface, run_id).await {
            Ok((files_synced, jobs_dispatched)) => {
                self.last_run
                    .lock()
                    .await
                    .insert(interface.to_string(), time::now());
                InterfaceReconciliation {
                    interface: interface.to_string(),
                    files_synced,
                    jobs_dispatched,
                    skipped: false,
                    error: None,
                }
            }
            Err(err) => {
                tracing::error!(
                    interface = %interface,
                    error = %err,
                    "Reconciliation failed for interface"
                );
                InterfaceReconciliation {
                    interface: interface.to_string(),
                    files_synced: 0,
                    jobs_dispatched: 0,
                    skipped: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn sync_and_dispatch(&self, interface: &str, run_id: Uuid) -> Result<(u64, u64)> {
        let metadata = json!({
            "reconciliation_run": run_id,
            "trigger": "reconciliation",
        });
        let files_synced = self.sync.sync_interface(interface, Some(&metadata)).await?;

        let pending = migrations::pending_for_interface(&self.pool, interface).await?;
        let mut jobs_dispatched = 0;
        for migration in pending {
            let dispatched = self
                .queue
                .dispatch(
                    ProcessMigrationJob {
                        migration_id: migration.id,
                        create_backup: true,
                        validate_checksum: true,
                    },
                    &self.queue_name,
                )
                .await?;
            if dispatched {
                jobs_dispatched += 1;
            }
        }
        Ok((files_synced, jobs_dispatched))
    }
}
