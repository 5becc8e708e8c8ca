//! Per-interface health verdicts
//!
//! Three signals per interface: pending-migration backlog, archive manifest
//! freshness (deployed environments only), and how recently a migration
//! completed. Signals combine by severity, worst wins.

use chrono::{DateTime, Utc};
use lexsync_common::config::{Config, Environment};
use lexsync_common::time::{Clock, SystemClock};
use lexsync_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::archive::ArchiveClient;
use crate::db;

const CACHE_TTL: Duration = Duration::from_secs(60);
const PENDING_WARNING_THRESHOLD: i64 = 10;
const MANIFEST_STALE_DAYS: i64 = 30;
const COMPLETION_RECENCY_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Warning,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceHealth {
    pub interface: String,
    pub status: Severity,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_migrations: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub interfaces: Vec<InterfaceHealth>,
}

pub struct HealthMonitor {
    pool: SqlitePool,
    archive: ArchiveClient,
    environment: Environment,
    interfaces: Vec<String>,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<(Instant, HealthReport)>>,
}

impl HealthMonitor {
    pub fn new(pool: SqlitePool, archive: ArchiveClient, config: &Config) -> Self {
        Self::with_clock(pool, archive, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: SqlitePool,
        archive: ArchiveClient,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            archive,
            environment: config.environment,
            interfaces: config.interfaces.clone(),
            clock,
            cache: Mutex::new(None),
        }
    }

    /// Current health, recomputed at most once per minute.
    /// Concurrent callers share one computation.
    pub async fn execute(&self) -> HealthReport {
        let mut cache = self.cache.lock().await;
        if let Some((computed_at, report)) = cache.as_ref() {
            if computed_at.elapsed() < CACHE_TTL {
                return report.clone();
            }
        }

        let report = self.run_checks().await;
        *cache = Some((Instant::now(), report.clone()));
        report
    }

    /// Recompute now, replacing whatever is cached
    pub async fn refresh(&self) -> HealthReport {
        let mut cache = self.cache.lock().await;
        let report = self.run_checks().await;
        *cache = Some((Instant::now(), report.clone()));
        report
    }

    async fn run_checks(&self) -> HealthReport {
        let mut entries = Vec::with_capacity(self.interfaces.len());
        for interface in &self.interfaces {
            let entry = match self.check_interface(interface).await {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::error!(
                        interface = %interface,
                        error = %err,
                        "Health check failed for interface"
                    );
                    InterfaceHealth {
                        interface: interface.clone(),
                        status: Severity::Error,
                        issues: vec![format!("health check failed: {}", err)],
                        pending_migrations: None,
                        last_applied_at: None,
                    }
                }
            };
            entries.push(entry);
        }

        let healthy = entries.iter().all(|e| e.status == Severity::Healthy);
        tracing::info!(healthy, interfaces = entries.len(), "Health check finished");
        HealthReport {
            checked_at: self.clock.now(),
            healthy,
            interfaces: entries,
        }
    }

    async fn check_interface(&self, interface: &str) -> Result<InterfaceHealth> {
        let mut status = Severity::Healthy;
        let mut issues = Vec::new();

        let pending = db::migrations::count_pending(&self.pool, interface).await?;
        if pending > PENDING_WARNING_THRESHOLD {
            status = status.max(Severity::Warning);
            issues.push(format!("{} pending migrations", pending));
        }

        if self.environment.is_deployed() {
            match self.archive.get_manifest(interface).await {
                Ok(None) => {
                    status = status.max(Severity::Degraded);
                    issues.push("manifest missing from archive".to_string());
                }
                Ok(Some(manifest)) => match manifest.updated_at {
                    Some(updated_at) => {
                        let age = self.clock.now() - updated_at;
                        if age > chrono::Duration::days(MANIFEST_STALE_DAYS) {
                            status = status.max(Severity::Warning);
                            issues.push(format!(
                                "manifest not updated for over {} days",
                                MANIFEST_STALE_DAYS
                            ));
                        }
                    }
                    None => {
                        status = status.max(Severity::Warning);
                        issues.push("manifest has no updated_at timestamp".to_string());
                    }
                },
                Err(Error::Serialization(err)) => {
                    status = status.max(Severity::Degraded);
                    issues.push(format!("manifest unreadable: {}", err));
                }
                Err(err) => return Err(err),
            }
        }

        let last_applied_at = db::migrations::latest_completed(&self.pool, interface)
            .await?
            .and_then(|m| m.applied_at);
        let recently_applied = last_applied_at.map_or(false, |at| {
            self.clock.now() - at <= chrono::Duration::hours(COMPLETION_RECENCY_HOURS)
        });
        if !recently_applied {
            status = status.max(Severity::Warning);
            issues.push(format!(
                "no migration completed in the last {} hours",
                COMPLETION_RECENCY_HOURS
            ));
        }

        Ok(InterfaceHealth {
            interface: interface.to_string(),
            status,
            issues,
            pending_migrations: Some(pending),
            last_applied_at,
        })
    }
}
