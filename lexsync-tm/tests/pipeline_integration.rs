// End-to-end pipeline tests
//
// Each test drives several modules together the way the binary wires them:
// archive sync feeding tracked migration records, worker-pool processing,
// import/export round trips, and rollback from backup artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sqlx::SqlitePool;

use lexsync_common::config::Config;
use lexsync_common::db::init_memory_database;
use lexsync_common::models::MigrationStatus;
use lexsync_common::time::FixedClock;
use lexsync_tm::apply::{ApplyOptions, MigrationApplier};
use lexsync_tm::archive::{sha256_hex, ArchiveClient, ArchiveStore, FsArchiveStore};
use lexsync_tm::db::migrations;
use lexsync_tm::export::ExportEngine;
use lexsync_tm::import::{ImportOptions, ImportOutcome, ImportPayload, ImportPipeline};
use lexsync_tm::jobs::{JobQueue, WorkerConfig, WorkerPool};
use lexsync_tm::reconcile::{ReconcileOptions, ReconcileScheduler};
use lexsync_tm::sync::MigrationSync;

fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
}

/// Archive client frozen at a given minute so sequential operations produce
/// distinct backup names
fn archive_at(store: &Arc<FsArchiveStore>, minute: u32) -> ArchiveClient {
    ArchiveClient::with_clock(
        store.clone() as Arc<dyn ArchiveStore>,
        Arc::new(FixedClock(at_minute(minute))),
    )
}

fn pipeline_at(pool: &SqlitePool, store: &Arc<FsArchiveStore>, minute: u32) -> ImportPipeline {
    let archive = archive_at(store, minute);
    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    ImportPipeline::new(pool.clone(), archive, export)
}

fn applier_at(pool: &SqlitePool, store: &Arc<FsArchiveStore>, minute: u32) -> MigrationApplier {
    let archive = archive_at(store, minute);
    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    let import = ImportPipeline::new(pool.clone(), archive.clone(), export.clone());
    MigrationApplier::new(pool.clone(), archive, import, export)
}

fn payload(value: serde_json::Value) -> ImportPayload {
    serde_json::from_value(value).unwrap()
}

async fn setup() -> (SqlitePool, tempfile::TempDir, Arc<FsArchiveStore>) {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArchiveStore::new(dir.path()));
    (pool, dir, store)
}

/// A migration uploaded to the archive becomes a tracked record through sync
/// and lands its translations through apply, with provenance and backup
/// metadata on the record.
#[tokio::test]
async fn test_synced_migration_applies_to_completion() {
    let (pool, _dir, store) = setup().await;

    let content = json!({
        "translations": {
            "auth.login": {"en-GB": "Sign in", "fr-FR": "Connexion"},
            "welcome": {"en-GB": "Welcome"}
        }
    })
    .to_string();
    archive_at(&store, 30)
        .upload_migration_file("mobile", "2024-03-01_093000.json", &content)
        .await
        .unwrap();

    let sync = MigrationSync::new(pool.clone(), archive_at(&store, 30));
    assert_eq!(sync.sync_interface("mobile", None).await.unwrap(), 1);

    let tracked = migrations::find_by_filename(&pool, "2024-03-01_093000.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tracked.status, MigrationStatus::Pending);
    assert_eq!(tracked.version, "2024-03-01_093000");
    assert_eq!(tracked.checksum, sha256_hex(&content));

    let applier = applier_at(&pool, &store, 31);
    let result = applier
        .execute(tracked.id, ApplyOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert!(result.backup_path.is_some());

    let completed = migrations::find_migration(&pool, tracked.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status, MigrationStatus::Completed);
    assert_eq!(completed.batch_number, Some(1));
    let metadata = completed.metadata.unwrap();
    assert_eq!(metadata["synced_from_s3"], json!(true));
    assert_eq!(metadata["summary"]["new_keys_created"], json!(2));

    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    let document = export.execute("mobile", None).await.unwrap();
    assert_eq!(document.total_keys, 2);
    assert_eq!(document.translations["auth.login"]["fr-FR"], "Connexion");
}

/// An export document fed straight back into an import classifies every
/// entry unchanged and creates nothing.
#[tokio::test]
async fn test_export_feeds_back_as_unchanged() {
    let (pool, _dir, store) = setup().await;

    let seed = payload(json!({
        "translations": {
            "auth.login": {"en-GB": "Sign in", "nl-NL": "Inloggen"},
            "auth.logout": {"en-GB": "Sign out"},
            "welcome": {"en-GB": "Welcome"}
        }
    }));
    pipeline_at(&pool, &store, 30)
        .execute(&seed, "mobile", ImportOptions::default())
        .await
        .unwrap();

    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    let document = export.execute("mobile", None).await.unwrap();
    let reimport =
        lexsync_tm::import::parse_payload(&serde_json::to_string(&document).unwrap()).unwrap();

    let preview = pipeline_at(&pool, &store, 31)
        .execute(
            &reimport,
            "mobile",
            ImportOptions {
                preview: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    match preview {
        ImportOutcome::Preview { summary, .. } => {
            assert_eq!(summary.new_keys, 0);
            assert_eq!(summary.updated_values, 0);
            assert_eq!(summary.new_values, 0);
            assert_eq!(summary.unchanged, 4);
        }
        ImportOutcome::Applied { .. } => panic!("expected a preview outcome"),
    }

    let applied = pipeline_at(&pool, &store, 32)
        .execute(&reimport, "mobile", ImportOptions::default())
        .await
        .unwrap();
    let summary = applied.applied_summary().unwrap();
    assert_eq!(summary.new_keys_created, 0);
    assert_eq!(summary.values_updated, 0);
    assert_eq!(summary.new_values_created, 0);
    assert_eq!(summary.unchanged, 4);
}

/// Empty-string values are real values and survive the import/export cycle
#[tokio::test]
async fn test_empty_string_values_survive_round_trip() {
    let (pool, _dir, store) = setup().await;

    let seed = payload(json!({
        "translations": {
            "banner.promo": {"en-GB": "", "fr-FR": "Promo"}
        }
    }));
    pipeline_at(&pool, &store, 30)
        .execute(&seed, "web_financer", ImportOptions::default())
        .await
        .unwrap();

    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    let document = export.execute("web_financer", None).await.unwrap();
    assert_eq!(document.translations["banner.promo"]["en-GB"], "");
    assert_eq!(document.translations["banner.promo"]["fr-FR"], "Promo");
}

/// Rollback restores the state captured by the most recent backup: values
/// overwritten by a later import revert.
#[tokio::test]
async fn test_rollback_restores_previous_values() {
    let (pool, _dir, store) = setup().await;

    let v1 = payload(json!({
        "translations": {"auth.login": {"en-GB": "Login"}}
    }));
    pipeline_at(&pool, &store, 30)
        .execute(&v1, "mobile", ImportOptions::default())
        .await
        .unwrap();

    // The second import backs up the v1 state before overwriting it
    let v2 = payload(json!({
        "translations": {"auth.login": {"en-GB": "Sign in"}}
    }));
    pipeline_at(&pool, &store, 31)
        .execute(
            &v2,
            "mobile",
            ImportOptions {
                update_existing_values: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let export = ExportEngine::new(pool.clone(), BTreeMap::new());
    let before = export.execute("mobile", None).await.unwrap();
    assert_eq!(before.translations["auth.login"]["en-GB"], "Sign in");

    let applier = applier_at(&pool, &store, 32);
    let result = applier.rollback("mobile").await.unwrap();
    assert!(result.restored_from.contains("2024-03-01_103100"));
    assert_eq!(result.rolled_back_migration_id, None);

    let after = export.execute("mobile", None).await.unwrap();
    assert_eq!(after.translations["auth.login"]["en-GB"], "Login");
}

/// Reconciliation syncs archive files, dispatches jobs, and the worker pool
/// drives every migration to completed with its translations applied.
#[tokio::test]
async fn test_reconcile_processes_pending_migrations_end_to_end() {
    let (pool, _dir, store) = setup().await;

    for (interface, key, value) in [
        ("mobile", "auth.login", "Sign in"),
        ("web_financer", "dashboard.title", "Overview"),
    ] {
        let content = json!({"translations": {key: {"en-GB": value}}}).to_string();
        archive_at(&store, 30)
            .upload_migration_file(
                interface,
                &format!("{}_2024-03-01_093000.json", interface),
                &content,
            )
            .await
            .unwrap();
    }

    let config = Config {
        interfaces: vec!["mobile".to_string(), "web_financer".to_string()],
        ..Config::default()
    };

    // Real worker pool; per-interface backup prefixes keep names distinct
    let applier = applier_at(&pool, &store, 31);
    let workers = WorkerPool::start(
        applier,
        pool.clone(),
        WorkerConfig {
            worker_count: 2,
            max_attempts: 2,
            retry_backoff: Duration::from_millis(10),
        },
    );
    let queue: Arc<dyn JobQueue> = Arc::new(workers.handle());
    let sync = MigrationSync::new(pool.clone(), archive_at(&store, 30));
    let scheduler = ReconcileScheduler::new(pool.clone(), sync, queue, &config);

    let report = scheduler.execute(&ReconcileOptions::default()).await;
    assert!(report.success);
    assert_eq!(report.total_files_synced, 2);
    assert_eq!(report.total_jobs_dispatched, 2);

    drop(scheduler);
    workers.drain().await;

    for (interface, key, value) in [
        ("mobile", "auth.login", "Sign in"),
        ("web_financer", "dashboard.title", "Overview"),
    ] {
        let tracked =
            migrations::find_by_filename(&pool, &format!("{}_2024-03-01_093000.json", interface))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(tracked.status, MigrationStatus::Completed);

        let export = ExportEngine::new(pool.clone(), BTreeMap::new());
        let document = export.execute(interface, None).await.unwrap();
        assert_eq!(document.translations[key]["en-GB"], value);
    }
}
