//! Host-local exclusive lock that keeps batch runs single-writer.
//!
//! Every worker on a host opens the same lock file and takes an advisory
//! exclusive `flock` on it through `fs2`. The lock is released when the
//! guard is dropped or the process exits, so a crashed worker never leaves
//! it held.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, info, warn};

use rooter_core::defaults;
use rooter_core::{Error, Result};

/// Proof that this process is the active batch processor.
pub struct WorkerLockGuard {
    _file: File,
    path: PathBuf,
}

impl WorkerLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkerLockGuard {
    fn drop(&mut self) {
        // Closing the file releases the flock.
        debug!(
            subsystem = "jobs",
            component = "lock",
            path = %self.path.display(),
            "Releasing worker lock"
        );
    }
}

impl std::fmt::Debug for WorkerLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLockGuard")
            .field("path", &self.path)
            .finish()
    }
}

/// Named lock file plus the retry policy used to acquire it.
#[derive(Debug, Clone)]
pub struct WorkerLock {
    path: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl WorkerLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: defaults::WORKER_LOCK_ATTEMPTS,
            retry_delay: Duration::from_millis(defaults::WORKER_LOCK_RETRY_MS),
        }
    }

    /// Total attempts made by [`acquire_with_retry`](Self::acquire_with_retry); at least one.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking acquire. `Ok(None)` means another process holds the lock.
    pub fn try_acquire(&self) -> Result<Option<WorkerLockGuard>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Lock(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::Lock(format!("open {}: {}", self.path.display(), e)))?;

        // Fully qualified so newer std's File::try_lock_exclusive is not picked.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(
                    subsystem = "jobs",
                    component = "lock",
                    path = %self.path.display(),
                    "Acquired worker lock"
                );
                Ok(Some(WorkerLockGuard {
                    _file: file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::Lock(format!("lock {}: {}", self.path.display(), e))),
        }
    }

    /// Try up to the configured number of attempts, sleeping between them.
    ///
    /// Returns `Ok(None)` when every attempt found the lock held.
    pub async fn acquire_with_retry(&self) -> Result<Option<WorkerLockGuard>> {
        for attempt in 1..=self.attempts {
            if let Some(guard) = self.try_acquire()? {
                if attempt > 1 {
                    info!(
                        subsystem = "jobs",
                        component = "lock",
                        attempt,
                        "Acquired worker lock after retry"
                    );
                }
                return Ok(Some(guard));
            }
            if attempt < self.attempts {
                debug!(
                    subsystem = "jobs",
                    component = "lock",
                    attempt,
                    retry_ms = self.retry_delay.as_millis() as u64,
                    "Worker lock held elsewhere, retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!(
            subsystem = "jobs",
            component = "lock",
            path = %self.path.display(),
            attempts = self.attempts,
            "Worker lock unavailable, giving up"
        );
        Ok(None)
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
