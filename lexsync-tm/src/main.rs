//! LexSync Translation Migrator (lexsync-tm) - Command line entry point
//!
//! Moves translation payloads between interface deployments and the shared
//! archive: import/export, archive reconciliation with an async worker pool,
//! migration apply/rollback, drift detection, and health reporting.
//!
//! Reports print as pretty JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexsync_common::config::Config;
use lexsync_common::db::init_database;
use lexsync_tm::apply::{ApplyOptions, MigrationApplier};
use lexsync_tm::archive::{ArchiveClient, FsArchiveStore};
use lexsync_tm::drift::{DriftDetector, FsLocalFiles};
use lexsync_tm::export::ExportEngine;
use lexsync_tm::health::HealthMonitor;
use lexsync_tm::import::{parse_payload, ImportOptions, ImportPipeline};
use lexsync_tm::jobs::{JobQueue, WorkerConfig, WorkerPool};
use lexsync_tm::reconcile::{ReconcileOptions, ReconcileScheduler};
use lexsync_tm::sync::MigrationSync;

/// Command-line arguments for lexsync-tm
#[derive(Parser, Debug)]
#[command(name = "lexsync-tm")]
#[command(about = "Translation migration and reconciliation for LexSync interfaces")]
#[command(version)]
struct Args {
    /// Configuration file (default: LEXSYNC_CONFIG, then the platform config dir)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a translation payload into an interface
    Import {
        /// Target interface
        #[arg(short, long)]
        interface: String,

        /// JSON payload file
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Classify changes without writing anything
        #[arg(long)]
        preview: bool,

        /// Overwrite values that already exist
        #[arg(long)]
        update_existing: bool,
    },

    /// Export an interface's translations as an import-ready payload
    Export {
        /// Source interface
        #[arg(short, long)]
        interface: String,

        /// Restrict the export to one locale (with configured fallbacks)
        #[arg(short, long)]
        locale: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Sync archive migrations and dispatch pending ones to workers
    Reconcile {
        /// Interface to reconcile (repeatable); defaults to all configured
        #[arg(short, long = "interface")]
        interfaces: Vec<String>,

        /// Ignore the per-interface cooldown
        #[arg(long)]
        force: bool,
    },

    /// Apply one tracked migration
    Apply {
        /// Record id of the migration to apply
        #[arg(long)]
        migration_id: i64,

        /// Skip the pre-apply backup
        #[arg(long)]
        no_backup: bool,

        /// Skip checksum validation against the archive
        #[arg(long)]
        skip_checksum: bool,
    },

    /// Restore an interface from its most recent backup
    Rollback {
        /// Interface to restore
        #[arg(short, long)]
        interface: String,
    },

    /// Compare archive migrations against local migration files
    Drift {
        /// Check a single interface instead of all configured
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Report per-interface health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs on stderr so stdout stays clean JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexsync_tm=info,lexsync_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        "Starting LexSync Translation Migrator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load(args.config.as_deref())?;
    info!(
        environment = config.environment.as_str(),
        database = %config.database_path.display(),
        archive = %config.archive_root.display(),
        "Configuration resolved"
    );

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let archive = ArchiveClient::new(Arc::new(FsArchiveStore::new(&config.archive_root)));
    let export = ExportEngine::new(pool.clone(), config.fallback_locales.clone());
    let import = ImportPipeline::new(pool.clone(), archive.clone(), export.clone());
    let applier = MigrationApplier::new(
        pool.clone(),
        archive.clone(),
        import.clone(),
        export.clone(),
    );

    match args.command {
        Command::Import {
            interface,
            file,
            preview,
            update_existing,
        } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let payload = parse_payload(&content)?;
            let options = ImportOptions {
                preview,
                update_existing_values: update_existing,
            };
            let outcome = import.execute(&payload, &interface, options).await?;
            print_json(&outcome)?;
        }

        Command::Export {
            interface,
            locale,
            output,
        } => {
            let document = export.execute(&interface, locale.as_deref()).await?;
            let json = serde_json::to_string_pretty(&document)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(
                        path = %path.display(),
                        keys = document.total_keys,
                        "Export written"
                    );
                }
                None => println!("{}", json),
            }
        }

        Command::Reconcile { interfaces, force } => {
            let workers = WorkerPool::start(
                applier,
                pool.clone(),
                WorkerConfig::from_config(&config),
            );
            let queue: Arc<dyn JobQueue> = Arc::new(workers.handle());
            let sync = MigrationSync::new(pool.clone(), archive.clone());
            let scheduler = ReconcileScheduler::new(pool.clone(), sync, queue, &config);

            let options = ReconcileOptions {
                interfaces: if interfaces.is_empty() {
                    None
                } else {
                    Some(interfaces)
                },
                force,
            };
            let report = scheduler.execute(&options).await;

            // Every queue handle must drop before the pool can drain
            drop(scheduler);
            workers.drain().await;
            print_json(&report)?;
        }

        Command::Apply {
            migration_id,
            no_backup,
            skip_checksum,
        } => {
            let options = ApplyOptions {
                create_backup: !no_backup,
                validate_checksum: !skip_checksum,
            };
            let result = applier.execute(migration_id, options).await?;
            print_json(&result)?;
        }

        Command::Rollback { interface } => {
            let result = applier.rollback(&interface).await?;
            print_json(&result)?;
        }

        Command::Drift { interface } => {
            let local = Arc::new(FsLocalFiles::new(&config.local_files_root));
            let detector = DriftDetector::new(archive.clone(), local, config.interfaces.clone());
            let report = detector.execute(interface.as_deref()).await;
            print_json(&report)?;
        }

        Command::Health => {
            let monitor = HealthMonitor::new(pool.clone(), archive.clone(), &config);
            let report = monitor.execute().await;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
