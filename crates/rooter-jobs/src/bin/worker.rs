//! rooter-worker: process one batch of fingerprinting jobs and exit.
//!
//! Meant to be invoked repeatedly by cron or a systemd timer. Exit codes:
//! 0 when the batch ran cleanly or another worker held the lock, 1 when a
//! job hit a store failure, 2 on startup or claim errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use rooter_core::defaults;
use rooter_db::{Database, ScratchDir};
use rooter_jobs::telemetry::{init_tracing, WORKER_LOG_FILTER};
use rooter_jobs::{BatchWorker, HasherRegistry, HasherSettings, RunOutcome, WorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "rooter-worker", version, about = "Run one batch of fingerprinting jobs")]
struct Args {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", default_value = defaults::DATABASE_URL)]
    database_url: String,

    /// Directory holding submitted payloads.
    #[arg(long, env = "SCRATCH_DIR", default_value = defaults::SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// Override WORKER_BATCH_SIZE for this run.
    #[arg(long)]
    batch_size: Option<i64>,

    /// Before the batch, return jobs stuck in processing longer than this
    /// many seconds to pending.
    #[arg(long, value_name = "SECS")]
    requeue_stale_secs: Option<u64>,

    /// Check every registered hasher and exit.
    #[arg(long)]
    check_hashers: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing(WORKER_LOG_FILTER, "rooter-worker.log");
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(subsystem = "jobs", component = "worker", error = %e, "Worker run aborted");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let registry = Arc::new(HasherRegistry::from_settings(&HasherSettings::from_env())?);

    if args.check_hashers {
        let mut healthy = true;
        for (namespace, ok) in registry.health_check_all().await {
            println!("{}\t{}", if ok { "ok" } else { "missing" }, namespace);
            healthy &= ok;
        }
        return Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let mut config = WorkerConfig::from_env();
    if let Some(n) = args.batch_size {
        config = config.with_batch_size(n);
    }

    let db = Database::connect(&args.database_url).await?;
    db.migrate().await?;
    let worker = BatchWorker::new(db, ScratchDir::new(&args.scratch_dir), registry, config);

    if let Some(secs) = args.requeue_stale_secs {
        match worker.requeue_stale(Duration::from_secs(secs)).await? {
            Some(n) => info!(requeued = n, "Stale job recovery finished"),
            None => {
                info!("Worker lock unavailable, skipping stale job recovery");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    match worker.run_once().await? {
        RunOutcome::LockUnavailable => Ok(ExitCode::SUCCESS),
        RunOutcome::Completed(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
