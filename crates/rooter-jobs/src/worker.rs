//! Single-run batch worker.
//!
//! A run takes the host lock, claims a bounded batch of Pending jobs and
//! drives each one to Done: sniff the payload, run every hasher that accepts
//! its media type, match each hash against its namespace, record the hits.
//! An external scheduler invokes one run at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rooter_core::defaults;
use rooter_core::{sniff_file, Error, Job, Result};
use rooter_db::{Database, ScratchDir};
use rooter_search::{Matcher, NamespacePolicy};

use crate::lock::WorkerLock;
use crate::registry::HasherRegistry;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs claimed per run.
    pub batch_size: i64,
    /// Host-local lock file.
    pub lock_path: PathBuf,
    /// Lock acquisition attempts before the run is abandoned.
    pub lock_attempts: u32,
    /// Sleep between lock attempts.
    pub lock_retry: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::WORKER_BATCH_SIZE,
            lock_path: PathBuf::from(defaults::WORKER_LOCK_PATH),
            lock_attempts: defaults::WORKER_LOCK_ATTEMPTS,
            lock_retry: Duration::from_millis(defaults::WORKER_LOCK_RETRY_MS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_BATCH_SIZE` | `10` | Jobs claimed per run |
    /// | `WORKER_LOCK_PATH` | `/tmp/rooter-worker.lock` | Shared lock file |
    /// | `WORKER_LOCK_ATTEMPTS` | `10` | Lock attempts before giving up |
    /// | `WORKER_LOCK_RETRY_MS` | `10000` | Sleep between lock attempts |
    pub fn from_env() -> Self {
        let batch_size = std::env::var("WORKER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::WORKER_BATCH_SIZE)
            .max(1);

        let lock_path = std::env::var("WORKER_LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::WORKER_LOCK_PATH));

        let lock_attempts = std::env::var("WORKER_LOCK_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::WORKER_LOCK_ATTEMPTS)
            .max(1);

        let lock_retry_ms = std::env::var("WORKER_LOCK_RETRY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WORKER_LOCK_RETRY_MS);

        Self {
            batch_size,
            lock_path,
            lock_attempts,
            lock_retry: Duration::from_millis(lock_retry_ms),
        }
    }

    pub fn with_batch_size(mut self, n: i64) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = path.into();
        self
    }

    pub fn with_lock_attempts(mut self, attempts: u32) -> Self {
        self.lock_attempts = attempts.max(1);
        self
    }

    pub fn with_lock_retry(mut self, delay: Duration) -> Self {
        self.lock_retry = delay;
        self
    }

    fn lock(&self) -> WorkerLock {
        WorkerLock::new(&self.lock_path)
            .with_attempts(self.lock_attempts)
            .with_retry_delay(self.lock_retry)
    }
}

/// A job that could not be finished this run.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub job_id: Uuid,
    pub error: String,
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Jobs finished with no payload on disk.
    pub missing_payload: usize,
    pub results_written: u64,
    pub namespaces_attempted: usize,
    pub namespaces_failed: usize,
    pub failures: Vec<JobFailure>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether any job hit a store error and was left in Processing.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Another worker held the lock; nothing was touched.
    LockUnavailable,
    Completed(RunReport),
}

/// Runs one batch per call.
pub struct BatchWorker {
    db: Database,
    scratch: ScratchDir,
    registry: Arc<HasherRegistry>,
    matcher: Matcher,
    config: WorkerConfig,
}

impl BatchWorker {
    pub fn new(
        db: Database,
        scratch: ScratchDir,
        registry: Arc<HasherRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let matcher = Matcher::new(db.fingerprints.clone());
        Self {
            db,
            scratch,
            registry,
            matcher,
            config,
        }
    }

    /// Replace the matcher (e.g. to change the hit cap).
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Acquire the lock and process one batch.
    ///
    /// Errors only when the lock file is unusable or the claim itself fails;
    /// per-job store failures are counted in the report instead.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let start = Instant::now();
        let Some(_guard) = self.config.lock().acquire_with_retry().await? else {
            warn!(
                subsystem = "jobs",
                component = "worker",
                op = "run_once",
                "Another worker is active, skipping this run"
            );
            return Ok(RunOutcome::LockUnavailable);
        };

        match self.db.jobs.stats().await {
            Ok(stats) => info!(
                subsystem = "jobs",
                component = "worker",
                op = "run_once",
                pending = stats.pending,
                processing = stats.processing,
                done = stats.done,
                "Worker run started"
            ),
            Err(e) => debug!(error = %e, "Queue stats unavailable"),
        }

        let jobs = self.db.jobs.claim_batch(self.config.batch_size).await?;
        let mut report = RunReport {
            claimed: jobs.len(),
            ..RunReport::default()
        };

        for job in &jobs {
            match self.process_job(job, &mut report).await {
                Ok(()) => report.completed += 1,
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "worker",
                        job_id = %job.id,
                        error = %e,
                        "Job left in processing after store failure"
                    );
                    report.failed += 1;
                    report.failures.push(JobFailure {
                        job_id: job.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            subsystem = "jobs",
            component = "worker",
            op = "run_once",
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            result_count = report.results_written,
            namespaces_failed = report.namespaces_failed,
            duration_ms = report.duration_ms,
            "Worker run finished"
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Drive one claimed job to Done.
    ///
    /// Hasher failures are absorbed per namespace. Store failures propagate
    /// and leave the job in Processing.
    async fn process_job(&self, job: &Job, report: &mut RunReport) -> Result<()> {
        let path = self.scratch.path_for(job.id);

        let media_type = match sniff_file(&path) {
            Ok(media_type) => media_type,
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    job_id = %job.id,
                    path = %path.display(),
                    error = %e,
                    "Payload unreadable, completing job without results"
                );
                report.missing_payload += 1;
                return self.db.jobs.complete(job.id).await;
            }
        };

        let hashers = self.registry.for_media_type(&media_type);
        debug!(
            subsystem = "jobs",
            component = "worker",
            job_id = %job.id,
            media_type = %media_type,
            namespaces = hashers.len(),
            "Dispatching payload"
        );

        for hasher in hashers {
            report.namespaces_attempted += 1;
            let namespace = hasher.namespace();

            let hash = match hasher.invoke(&path).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        job_id = %job.id,
                        namespace,
                        error = %e,
                        "Hasher failed, namespace contributes no results"
                    );
                    report.namespaces_failed += 1;
                    continue;
                }
            };

            let policy = NamespacePolicy::of(hasher.as_ref());
            let outcome = match self.matcher.search_hex(&hash, &policy, None, None).await {
                Ok(outcome) => outcome,
                Err(Error::InvalidInput(msg)) => {
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        job_id = %job.id,
                        namespace,
                        error = %msg,
                        "Hash rejected by matcher"
                    );
                    report.namespaces_failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let written = self
                .db
                .jobs
                .record_results(job.id, namespace, &outcome.hits)
                .await?;
            report.results_written += written;
        }

        self.db.jobs.complete(job.id).await?;
        info!(
            subsystem = "jobs",
            component = "worker",
            job_id = %job.id,
            "Job done"
        );
        Ok(())
    }

    /// Operator recovery: return jobs stuck in Processing for longer than
    /// `older_than` to Pending, dropping their partial results.
    ///
    /// Holds the worker lock so it never races an active run. Returns `None`
    /// when the lock is unavailable.
    pub async fn requeue_stale(&self, older_than: Duration) -> Result<Option<u64>> {
        let Some(_guard) = self.config.lock().acquire_with_retry().await? else {
            return Ok(None);
        };
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::InvalidInput(format!("requeue age out of range: {}", e)))?;
        let requeued = self.db.jobs.requeue_stale(Utc::now() - age).await?;
        info!(
            subsystem = "jobs",
            component = "worker",
            op = "requeue_stale",
            requeued,
            older_than_secs = older_than.as_secs(),
            "Requeued stale jobs"
        );
        Ok(Some(requeued))
    }
}
