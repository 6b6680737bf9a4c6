//! Structured logging schema and field name constants for rooter.
//!
//! `tracing` macros take field names as identifiers, so call sites spell
//! them as literals (`subsystem = "jobs"`, `job_id = %id`). This module is
//! the reference list of those names: new call sites reuse one from here
//! instead of inventing a synonym, so log aggregation can query the API
//! server and the worker by the same fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Store write failed, requires operator attention |
//! | WARN  | Recoverable issue (hasher failure, lock unavailable, bad stored hash) |
//! | INFO  | Lifecycle events (startup, run start/finish, job done) |
//! | DEBUG | Decision points, dispatch choices, config values |
//! | TRACE | Per-row iteration (candidate fingerprints) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "worker", "matcher", "registry", "lock", "intake"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run_once", "claim_batch", "search", "invoke"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job handle being processed.
pub const JOB_ID: &str = "job_id";

/// Hasher namespace involved in the event.
pub const NAMESPACE: &str = "namespace";

/// Sniffed media type of a payload.
pub const MEDIA_TYPE: &str = "media_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or written for a job.
pub const RESULT_COUNT: &str = "result_count";

/// Number of jobs claimed in a batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Hamming threshold applied to a search.
pub const MAX_DISTANCE: &str = "max_distance";
