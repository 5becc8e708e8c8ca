//! In-process job queue for asynchronous migration processing
//!
//! Jobs are deduplicated on a uniqueness key while queued or running, the
//! way a distributed queue would treat a unique job. Workers retry failing
//! jobs with a fixed backoff and record a `job_error` on the migration once
//! attempts are exhausted.

use async_trait::async_trait;
use lexsync_common::config::Config;
use lexsync_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::apply::{ApplyOptions, MigrationApplier};
use crate::db::migrations;

/// One queued migration application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMigrationJob {
    pub migration_id: i64,
    pub create_backup: bool,
    pub validate_checksum: bool,
}

impl ProcessMigrationJob {
    pub fn uniqueness_key(&self) -> String {
        format!("migration_{}", self.migration_id)
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a job. Returns false when an identical job is already queued
    /// or running.
    async fn dispatch(&self, job: ProcessMigrationJob, queue_name: &str) -> Result<bool>;
}

/// Worker tuning, usually derived from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            max_attempts: config.job_max_attempts,
            retry_backoff: Duration::from_secs(config.job_retry_backoff_secs),
        }
    }
}

/// Cloneable dispatch handle onto a running [`WorkerPool`]
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<ProcessMigrationJob>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl JobQueue for QueueHandle {
    async fn dispatch(&self, job: ProcessMigrationJob, queue_name: &str) -> Result<bool> {
        let key = job.uniqueness_key();
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(key.clone()) {
                tracing::debug!(key = %key, "Job already queued, skipping dispatch");
                return Ok(false);
            }
        }
        if self.tx.send(job).is_err() {
            self.in_flight.lock().await.remove(&key);
            return Err(Error::Internal("job queue is closed".into()));
        }
        tracing::info!(queue = %queue_name, key = %key, "Job dispatched");
        Ok(true)
    }
}

pub struct WorkerPool {
    handle: QueueHandle,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the worker tasks and return the running pool
    pub fn start(applier: MigrationApplier, pool: SqlitePool, config: WorkerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..config.worker_count.max(1))
            .map(|worker_id| {
                let rx = rx.clone();
                let in_flight = in_flight.clone();
                let applier = applier.clone();
                let pool = pool.clone();
                tokio::spawn(async move {
                    run_worker(worker_id, rx, in_flight, applier, pool, config).await;
                })
            })
            .collect();

        Self {
            handle: QueueHandle { tx, in_flight },
            workers,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Stop accepting work and wait for queued jobs to finish.
    ///
    /// Completes once every cloned [`QueueHandle`] has been dropped and the
    /// workers have drained the channel.
    pub async fn drain(self) {
        let WorkerPool { handle, workers } = self;
        drop(handle);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<ProcessMigrationJob>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    applier: MigrationApplier,
    pool: SqlitePool,
    config: WorkerConfig,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };

        process_job(&applier, &pool, &job, config).await;
        in_flight.lock().await.remove(&job.uniqueness_key());
    }
    tracing::debug!(worker_id, "Worker stopped");
}

async fn process_job(
    applier: &MigrationApplier,
    pool: &SqlitePool,
    job: &ProcessMigrationJob,
    config: WorkerConfig,
) {
    let options = ApplyOptions {
        create_backup: job.create_backup,
        validate_checksum: job.validate_checksum,
    };

    let mut last_error = String::new();
    for attempt in 1..=config.max_attempts.max(1) {
        match applier.execute(job.migration_id, options).await {
            Ok(result) if result.success => {
                tracing::info!(
                    migration_id = job.migration_id,
                    attempt,
                    "Migration job succeeded"
                );
                return;
            }
            Ok(result) => {
                last_error = result
                    .error
                    .unwrap_or_else(|| "migration application failed".to_string());
            }
            Err(err) => {
                last_error = err.to_string();
            }
        }
        tracing::warn!(
            migration_id = job.migration_id,
            attempt,
            error = %last_error,
            "Migration job attempt failed"
        );
        if attempt < config.max_attempts {
            tokio::time::sleep(config.retry_backoff).await;
        }
    }

    if let Err(err) =
        migrations::mark_failed(pool, job.migration_id, &json!({ "job_error": last_error })).await
    {
        tracing::error!(
            migration_id = job.migration_id,
            error = %err,
            "Could not record job failure"
        );
    }
    tracing::error!(
        migration_id = job.migration_id,
        attempts = config.max_attempts,
        "Migration job exhausted retries"
    );
}
