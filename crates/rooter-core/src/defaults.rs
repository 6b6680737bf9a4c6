//! Centralized default constants for rooter.
//!
//! Environment-driven configuration falls back to these values. Keeping them
//! in one place means the worker, the API server, and the tests agree on the
//! same thresholds.

// =============================================================================
// HASHER NAMESPACES
// =============================================================================

/// Namespace of the still-image blockhash algorithm.
pub const BLOCKHASH_NAMESPACE: &str = "http://videorooter.org/ns/blockhash";

/// Namespace of the video blockhash algorithm.
pub const BLOCKHASH_VIDEO_NAMESPACE: &str = "http://videorooter.org/ns/x-blockhash-video-cv";

/// Default command for the image hasher (resolved through `PATH`).
pub const BLOCKHASH_CMD: &str = "blockhash";

/// Default command for the video hasher (resolved through `PATH`).
pub const BLOCKHASH_VIDEO_CMD: &str = "blockhash-video";

/// Media types accepted by the image namespace.
pub const BLOCKHASH_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// Media types accepted by the video namespace.
pub const BLOCKHASH_VIDEO_TYPES: &[&str] = &["video/mp4", "video/mpeg", "video/ogg", "video/webm"];

/// Default match threshold for the image namespace (strict upper bound).
pub const BLOCKHASH_MAX_DISTANCE: u32 = 10;

/// Default match threshold for the video namespace (strict upper bound).
pub const BLOCKHASH_VIDEO_MAX_DISTANCE: u32 = 40;

/// Width of a blockhash fingerprint in bits (64 hex characters).
pub const HASH_BITS: u32 = 256;

/// Per-invocation timeout for external hashers.
pub const HASHER_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// WORKER
// =============================================================================

/// Maximum number of jobs claimed by one worker run.
pub const WORKER_BATCH_SIZE: i64 = 10;

/// Host-local lock file shared by every worker instance.
pub const WORKER_LOCK_PATH: &str = "/tmp/rooter-worker.lock";

/// Number of lock acquisition attempts before the run is abandoned.
pub const WORKER_LOCK_ATTEMPTS: u32 = 10;

/// Sleep between lock acquisition attempts.
pub const WORKER_LOCK_RETRY_MS: u64 = 10_000;

/// Directory holding submitted payloads, one file per job handle.
pub const SCRATCH_DIR: &str = "/tmp/rooter-queue";

// =============================================================================
// SEARCH
// =============================================================================

/// Maximum number of hits returned by a single search.
pub const SEARCH_LIMIT: i64 = 1000;

// =============================================================================
// API
// =============================================================================

/// Default listen address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const SERVER_PORT: u16 = 8080;

/// Largest accepted submission body (64 MiB).
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// DATABASE
// =============================================================================

/// Fallback connection string when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/rooter";

/// Default maximum pool connections.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Default minimum idle pool connections.
pub const POOL_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait for a pooled connection.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle connection is closed.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;
