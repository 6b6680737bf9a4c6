//! Core traits for rooter abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::media::MediaType;
use crate::models::*;

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for the fingerprinting job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new Pending job under `id`.
    async fn create(&self, id: Uuid, contact: Option<&str>) -> Result<Job>;

    /// Atomically move up to `limit` Pending jobs to Processing and return them.
    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>>;

    /// Append results for one (job, namespace) pair in a single transaction.
    ///
    /// Only a Processing job accepts results: `JobNotFound` for an unknown
    /// handle, `InvalidInput` for a Pending or Done job.
    async fn record_results(&self, job_id: Uuid, namespace: &str, hits: &[MatchHit])
        -> Result<u64>;

    /// Move a Processing job to Done and stamp the completion time.
    ///
    /// Fails with `JobNotFound` when the job is not currently Processing.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Get job by handle.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Results of a job, closest first (ties by work id).
    async fn results(&self, job_id: Uuid) -> Result<Vec<JobResult>>;

    /// Operator recovery: return jobs claimed before `claimed_before` to Pending
    /// and drop their partial results. Returns the number of jobs requeued.
    async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64>;

    /// Job counts by status.
    async fn stats(&self) -> Result<QueueStats>;
}

// =============================================================================
// FINGERPRINT REPOSITORY
// =============================================================================

/// Repository for stored fingerprints, the target of search.
#[async_trait]
pub trait FingerprintRepository: Send + Sync {
    /// Insert or replace the fingerprint for (manifestation, namespace).
    async fn upsert(&self, manifestation_id: Uuid, namespace: &str, hash: &str) -> Result<Uuid>;

    /// Stream every fingerprint in `namespace`, joined to its manifestation and work.
    fn scan_namespace<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxStream<'a, Result<FingerprintCandidate>>;

    /// Number of fingerprints stored in `namespace`.
    async fn count(&self, namespace: &str) -> Result<i64>;
}

// =============================================================================
// WORK REPOSITORY
// =============================================================================

/// Minimal write path into the catalog, used by seeding tools and tests.
#[async_trait]
pub trait WorkRepository: Send + Sync {
    async fn create_work(&self, req: CreateWorkRequest) -> Result<Uuid>;

    async fn get_work(&self, id: Uuid) -> Result<Option<Work>>;

    /// Attach a manifestation to an existing work.
    async fn add_manifestation(
        &self,
        work_id: Uuid,
        url: &str,
        media_type: &MediaType,
    ) -> Result<Uuid>;

    async fn get_manifestation(&self, id: Uuid) -> Result<Option<Manifestation>>;
}

// =============================================================================
// HASHER
// =============================================================================

/// A perceptual hashing algorithm identified by its namespace.
#[async_trait]
pub trait Hasher: Send + Sync {
    /// Namespace URI that tags every fingerprint this hasher produces.
    fn namespace(&self) -> &str;

    /// Canonical media types this hasher can fingerprint.
    fn accepted_types(&self) -> &[MediaType];

    /// Whether a payload of `media_type` should be sent to this hasher.
    fn accepts(&self, media_type: &MediaType) -> bool {
        !media_type.is_unknown() && self.accepted_types().contains(media_type)
    }

    /// Width of the hash in bits.
    fn hash_bits(&self) -> u32;

    /// Default match threshold (strict upper bound on Hamming distance).
    fn max_distance(&self) -> u32;

    /// Hash the file at `path`, returning lowercase hex of `hash_bits()` width.
    async fn invoke(&self, path: &Path) -> Result<String>;

    /// Check whether the hasher is usable on this host.
    async fn health_check(&self) -> Result<bool>;
}
