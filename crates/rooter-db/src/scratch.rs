//! Scratch directory holding submitted payloads until a worker hashes them.
//!
//! Each job's payload lives at `<root>/<handle>`. Writes go to a hidden temp
//! file first and are renamed into place, so a file under a job's name is
//! always complete.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use rooter_core::Result;

/// Directory of payload files keyed by job handle.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the payload for `job_id` lives (whether or not it exists yet).
    pub fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Atomically write the payload for `job_id`.
    pub async fn write(&self, job_id: Uuid, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;

        let final_path = self.path_for(job_id);
        let temp_path = self.root.join(format!(".{}.part", job_id));
        debug!(
            subsystem = "db",
            component = "scratch",
            op = "write",
            job_id = %job_id,
            size = data.len(),
            "Writing payload"
        );

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            warn!(
                subsystem = "db",
                component = "scratch",
                from = %temp_path.display(),
                to = %final_path.display(),
                error = %e,
                "Rename failed"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(final_path)
    }

    /// Remove the payload for `job_id`, ignoring a file that is already gone.
    pub async fn remove(&self, job_id: Uuid) -> Result<()> {
        match fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the directory and check that it is writable.
    pub async fn validate(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(".health-check");
        fs::write(&probe, b"scratch-health-check").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}
