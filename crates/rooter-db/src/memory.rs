//! In-memory repositories.
//!
//! One [`MemoryStore`] implements every repository trait over shared state,
//! so a [`crate::Database`] built with `in_memory()` behaves like a single
//! store. Used by tests and by local runs without PostgreSQL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use rooter_core::{
    CreateWorkRequest, Error, Fingerprint, FingerprintCandidate, FingerprintRepository, Job,
    JobRepository, JobResult, JobStatus, Manifestation, MatchHit, MediaType, QueueStats, Result,
    Work, WorkRepository,
};

#[derive(Default)]
struct State {
    works: HashMap<Uuid, Work>,
    manifestations: HashMap<Uuid, Manifestation>,
    fingerprints: HashMap<(Uuid, String), Fingerprint>,
    jobs: HashMap<Uuid, Job>,
    results: Vec<JobResult>,
}

/// Shared in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create(&self, id: Uuid, contact: Option<&str>) -> Result<Job> {
        let mut state = self.lock()?;
        if state.jobs.contains_key(&id) {
            return Err(Error::InvalidInput(format!("job {} already exists", id)));
        }
        let job = Job {
            id,
            status: JobStatus::Pending,
            contact: contact.map(str::to_string),
            requested_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>> {
        let mut state = self.lock()?;
        let mut pending: Vec<(DateTime<Utc>, Uuid)> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| (j.requested_at, j.id))
            .collect();
        pending.sort();
        pending.truncate(limit.max(0) as usize);

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(pending.len());
        for (_, id) in pending {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.status = JobStatus::Processing;
                job.claimed_at = Some(now);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn record_results(
        &self,
        job_id: Uuid,
        namespace: &str,
        hits: &[MatchHit],
    ) -> Result<u64> {
        let mut state = self.lock()?;
        match state.jobs.get(&job_id) {
            None => return Err(Error::JobNotFound(job_id)),
            Some(job) if job.status != JobStatus::Processing => {
                return Err(Error::InvalidInput(format!(
                    "job {} is {}, results are only recorded while processing",
                    job_id, job.status
                )));
            }
            Some(_) => {}
        }
        let now = Utc::now();
        for hit in hits {
            state.results.push(JobResult {
                id: Uuid::now_v7(),
                job_id,
                work_id: hit.work_id,
                work_title: None,
                namespace: namespace.to_string(),
                distance: hit.distance,
                created_at: now,
            });
        }
        Ok(hits.len() as u64)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Done;
                job.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(Error::JobNotFound(job_id)),
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn results(&self, job_id: Uuid) -> Result<Vec<JobResult>> {
        let state = self.lock()?;
        let mut results: Vec<JobResult> = state
            .results
            .iter()
            .filter(|r| r.job_id == job_id)
            .map(|r| JobResult {
                work_title: state.works.get(&r.work_id).and_then(|w| w.title.clone()),
                ..r.clone()
            })
            .collect();
        results.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then(a.work_id.cmp(&b.work_id))
                .then(a.id.cmp(&b.id))
        });
        Ok(results)
    }

    async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock()?;
        let stale: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Processing
                    && j.claimed_at.is_some_and(|t| t < claimed_before)
            })
            .map(|j| j.id)
            .collect();

        state.results.retain(|r| !stale.contains(&r.job_id));
        for id in &stale {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Pending;
                job.claimed_at = None;
            }
        }
        Ok(stale.len() as u64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let state = self.lock()?;
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Done => stats.done += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl FingerprintRepository for MemoryStore {
    async fn upsert(&self, manifestation_id: Uuid, namespace: &str, hash: &str) -> Result<Uuid> {
        let mut state = self.lock()?;
        if !state.manifestations.contains_key(&manifestation_id) {
            return Err(Error::NotFound(format!("manifestation {}", manifestation_id)));
        }
        let hash = hash.trim().to_ascii_lowercase();
        let now = Utc::now();
        let key = (manifestation_id, namespace.to_string());
        let fp = state.fingerprints.entry(key).or_insert_with(|| Fingerprint {
            id: Uuid::now_v7(),
            manifestation_id,
            namespace: namespace.to_string(),
            hash: String::new(),
            updated_at: now,
        });
        fp.hash = hash;
        fp.updated_at = now;
        Ok(fp.id)
    }

    fn scan_namespace<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxStream<'a, Result<FingerprintCandidate>> {
        let state = match self.lock() {
            Ok(state) => state,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let rows: Vec<Result<FingerprintCandidate>> = state
            .fingerprints
            .values()
            .filter(|fp| fp.namespace == namespace)
            .filter_map(|fp| {
                let m = state.manifestations.get(&fp.manifestation_id)?;
                let w = state.works.get(&m.work_id)?;
                Some(Ok(FingerprintCandidate {
                    fingerprint_id: fp.id,
                    manifestation_id: m.id,
                    work_id: w.id,
                    work_title: w.title.clone(),
                    hash: fp.hash.clone(),
                }))
            })
            .collect();
        stream::iter(rows).boxed()
    }

    async fn count(&self, namespace: &str) -> Result<i64> {
        let state = self.lock()?;
        Ok(state
            .fingerprints
            .values()
            .filter(|fp| fp.namespace == namespace)
            .count() as i64)
    }
}

#[async_trait]
impl WorkRepository for MemoryStore {
    async fn create_work(&self, req: CreateWorkRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let work = Work {
            id,
            title: req.title,
            description: req.description,
            rights_statement: req.rights_statement,
            credit: req.credit,
            credit_url: req.credit_url,
            collection_url: req.collection_url,
            source_id: req.source_id,
            updated_at: Utc::now(),
        };
        self.lock()?.works.insert(id, work);
        Ok(id)
    }

    async fn get_work(&self, id: Uuid) -> Result<Option<Work>> {
        Ok(self.lock()?.works.get(&id).cloned())
    }

    async fn add_manifestation(
        &self,
        work_id: Uuid,
        url: &str,
        media_type: &MediaType,
    ) -> Result<Uuid> {
        let mut state = self.lock()?;
        if !state.works.contains_key(&work_id) {
            return Err(Error::NotFound(format!("work {}", work_id)));
        }
        let id = Uuid::now_v7();
        state.manifestations.insert(
            id,
            Manifestation {
                id,
                work_id,
                url: url.to_string(),
                media_type: media_type.clone(),
            },
        );
        Ok(id)
    }

    async fn get_manifestation(&self, id: Uuid) -> Result<Option<Manifestation>> {
        Ok(self.lock()?.manifestations.get(&id).cloned())
    }
}
