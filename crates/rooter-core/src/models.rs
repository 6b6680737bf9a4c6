//! Data model shared by the store, the worker, and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::MediaType;

// =============================================================================
// CATALOG
// =============================================================================

/// A conceptual creative work, described by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub rights_statement: Option<String>,
    pub credit: Option<String>,
    pub credit_url: Option<String>,
    pub collection_url: Option<String>,
    pub source_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a work. All descriptive fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateWorkRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rights_statement: Option<String>,
    pub credit: Option<String>,
    pub credit_url: Option<String>,
    pub collection_url: Option<String>,
    pub source_id: Option<String>,
}

impl CreateWorkRequest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// One concrete rendition of a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifestation {
    pub id: Uuid,
    pub work_id: Uuid,
    pub url: String,
    pub media_type: MediaType,
}

/// A stored perceptual hash. At most one per (manifestation, namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub id: Uuid,
    pub manifestation_id: Uuid,
    pub namespace: String,
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

/// A stored fingerprint joined to its owning manifestation and work.
///
/// The hash is still the raw stored string; the matcher decodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintCandidate {
    pub fingerprint_id: Uuid,
    pub manifestation_id: Uuid,
    pub work_id: Uuid,
    pub work_title: Option<String>,
    pub hash: String,
}

/// A fingerprint within the search threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHit {
    pub work_id: Uuid,
    pub work_title: Option<String>,
    pub manifestation_id: Uuid,
    pub fingerprint_id: Uuid,
    pub namespace: String,
    pub distance: u32,
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Status of a fingerprinting job. Ordered by lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            _ => None,
        }
    }

    /// The only status this one may advance to during normal processing.
    pub fn next(&self) -> Option<Self> {
        match self {
            JobStatus::Pending => Some(JobStatus::Processing),
            JobStatus::Processing => Some(JobStatus::Done),
            JobStatus::Done => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted fingerprinting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Random v4 handle returned to the submitter.
    pub id: Uuid,
    pub status: JobStatus,
    pub contact: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set iff `status` is `Done`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

/// A match recorded against a job. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub work_id: Uuid,
    /// Joined from the work at read time.
    pub work_title: Option<String>,
    pub namespace: String,
    pub distance: u32,
    pub created_at: DateTime<Utc>,
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.done
    }
}

/// Sort hits closest first, ties by work id, and keep at most `limit`.
pub fn rank_hits(hits: &mut Vec<MatchHit>, limit: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.work_id.cmp(&b.work_id))
            .then_with(|| a.fingerprint_id.cmp(&b.fingerprint_id))
    });
    hits.truncate(limit);
}
