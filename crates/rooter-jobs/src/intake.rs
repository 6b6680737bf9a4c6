//! Job submission and polling.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use rooter_core::defaults;
use rooter_core::{Error, Job, JobResult, JobStatus, Result};
use rooter_db::{Database, ScratchDir};

/// What a poll reports back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Pending or Processing; results are not available yet.
    Processing,
    Done {
        completed_at: DateTime<Utc>,
        /// Closest first.
        results: Vec<JobResult>,
    },
}

/// Accepts payloads and reports job progress.
#[derive(Clone)]
pub struct JobIntake {
    db: Database,
    scratch: ScratchDir,
    max_bytes: usize,
}

impl JobIntake {
    pub fn new(db: Database, scratch: ScratchDir) -> Self {
        Self {
            db,
            scratch,
            max_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store the payload and queue a Pending job for it.
    ///
    /// The payload is on disk before the job row exists, so a worker never
    /// claims a job without its file.
    pub async fn submit(&self, data: &[u8], contact: Option<&str>) -> Result<Job> {
        if data.is_empty() {
            return Err(Error::InvalidInput("payload is empty".to_string()));
        }
        if data.len() > self.max_bytes {
            return Err(Error::InvalidInput(format!(
                "payload is {} bytes, limit is {}",
                data.len(),
                self.max_bytes
            )));
        }
        let contact = contact.map(str::trim).filter(|c| !c.is_empty());

        let id = Uuid::new_v4();
        self.scratch.write(id, data).await?;

        let job = match self.db.jobs.create(id, contact).await {
            Ok(job) => job,
            Err(e) => {
                if let Err(cleanup) = self.scratch.remove(id).await {
                    warn!(
                        subsystem = "jobs",
                        component = "intake",
                        job_id = %id,
                        error = %cleanup,
                        "Failed to remove orphaned payload"
                    );
                }
                return Err(e);
            }
        };

        info!(
            subsystem = "jobs",
            component = "intake",
            op = "submit",
            job_id = %job.id,
            size = data.len(),
            "Job submitted"
        );
        Ok(job)
    }

    /// Report the state of job `id`. Unknown handles are `JobNotFound`.
    pub async fn poll(&self, id: Uuid) -> Result<PollStatus> {
        let job = self.db.jobs.get(id).await?.ok_or(Error::JobNotFound(id))?;
        match (job.status, job.completed_at) {
            (JobStatus::Done, Some(completed_at)) => {
                let results = self.db.jobs.results(id).await?;
                Ok(PollStatus::Done {
                    completed_at,
                    results,
                })
            }
            (JobStatus::Done, None) => Err(Error::Internal(format!(
                "job {} is done without a completion time",
                id
            ))),
            _ => Ok(PollStatus::Processing),
        }
    }
}
