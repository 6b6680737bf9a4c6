//! External-command hashers.
//!
//! A hasher is any executable that takes a file path as its last argument
//! and prints the hash as the first whitespace-delimited token of stdout.
//! Stderr is ignored.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use rooter_core::defaults;
use rooter_core::{Error, FingerprintHash, Hasher, MediaType, Result};

/// Hasher backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandHasher {
    namespace: String,
    command: PathBuf,
    args: Vec<String>,
    accepted_types: Vec<MediaType>,
    hash_bits: u32,
    max_distance: u32,
    timeout: Duration,
}

impl CommandHasher {
    pub fn new(
        namespace: impl Into<String>,
        command: impl Into<PathBuf>,
        accepted_types: impl IntoIterator<Item = MediaType>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            command: command.into(),
            args: Vec::new(),
            accepted_types: accepted_types.into_iter().collect(),
            hash_bits: defaults::HASH_BITS,
            max_distance: defaults::BLOCKHASH_MAX_DISTANCE,
            timeout: Duration::from_secs(defaults::HASHER_TIMEOUT_SECS),
        }
    }

    /// Arguments placed before the file path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_hash_bits(mut self, bits: u32) -> Self {
        self.hash_bits = bits;
        self
    }

    pub fn with_max_distance(mut self, distance: u32) -> Self {
        self.max_distance = distance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Extract and validate the hash from raw stdout.
    fn parse_output(&self, stdout: &str) -> Result<String> {
        let token = stdout
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::Hasher(format!("{}: empty output", self.namespace)))?;
        let hash = FingerprintHash::parse(token, self.hash_bits)
            .map_err(|e| Error::Hasher(format!("{}: {}", self.namespace, e)))?;
        Ok(hash.to_hex())
    }
}

#[async_trait]
impl Hasher for CommandHasher {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn accepted_types(&self) -> &[MediaType] {
        &self.accepted_types
    }

    fn hash_bits(&self) -> u32 {
        self.hash_bits
    }

    fn max_distance(&self) -> u32 {
        self.max_distance
    }

    async fn invoke(&self, path: &Path) -> Result<String> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::Hasher(format!(
                    "{}: timed out after {}s",
                    self.namespace,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                Error::Hasher(format!(
                    "{}: failed to run {}: {}",
                    self.namespace,
                    self.command.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::Hasher(format!(
                "{}: command failed ({})",
                self.namespace, output.status
            )));
        }

        let hash = self.parse_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            subsystem = "jobs",
            component = "hasher",
            op = "invoke",
            namespace = %self.namespace,
            duration_ms = start.elapsed().as_millis() as u64,
            "Hasher produced fingerprint"
        );
        Ok(hash)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(resolve_command(&self.command).is_some())
    }
}

/// Locate an executable the way the shell would: paths with a separator are
/// taken as-is, bare names are searched on `PATH`.
fn resolve_command(command: &Path) -> Option<PathBuf> {
    if command.components().count() > 1 {
        return is_executable(command).then(|| command.to_path_buf());
    }
    let name: &OsStr = command.as_os_str();
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        #[cfg(unix)]
        Ok(meta) => {
            use std::os::unix::fs::PermissionsExt;
            meta.is_file() && meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_scripts::write_script;
    use super::*;

    fn png() -> Vec<MediaType> {
        vec![MediaType::new("image/png")]
    }

    fn hasher(dir: &Path, body: &str) -> CommandHasher {
        CommandHasher::new("urn:test", write_script(dir, "hash.sh", body), png())
    }

    #[tokio::test]
    async fn test_invoke_takes_first_token() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), &format!("echo '{}  $1'", "AB".repeat(32)));
        let out = h.invoke(Path::new("/some/file.png")).await.unwrap();
        assert_eq!(out, "ab".repeat(32));
    }

    #[tokio::test]
    async fn test_invoke_passes_path_last() {
        let dir = tempfile::tempdir().unwrap();
        // Echo the zero hash only when the last argument is the expected path.
        let body = format!(
            "[ \"$2\" = \"/x/y.png\" ] && [ \"$1\" = \"--fast\" ] && echo {}",
            "0".repeat(64)
        );
        let h = hasher(dir.path(), &body).with_args(vec!["--fast".to_string()]);
        assert_eq!(h.invoke(Path::new("/x/y.png")).await.unwrap(), "0".repeat(64));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_hasher_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), &format!("echo {}; exit 3", "0".repeat(64)));
        let err = h.invoke(Path::new("/f")).await.unwrap_err();
        assert!(matches!(err, Error::Hasher(_)));
    }

    #[tokio::test]
    async fn test_empty_output_is_hasher_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), "true");
        let err = h.invoke(Path::new("/f")).await.unwrap_err();
        assert!(err.to_string().contains("empty output"));
    }

    #[tokio::test]
    async fn test_wrong_width_is_hasher_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), "echo deadbeef");
        let err = h.invoke(Path::new("/f")).await.unwrap_err();
        assert!(matches!(err, Error::Hasher(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_hasher_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), "sleep 5").with_timeout(Duration::from_millis(100));
        let err = h.invoke(Path::new("/f")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_command_is_hasher_error() {
        let h = CommandHasher::new("urn:test", "/nonexistent/hasher", png());
        let err = h.invoke(Path::new("/f")).await.unwrap_err();
        assert!(matches!(err, Error::Hasher(_)));
        assert!(!h.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_finds_script() {
        let dir = tempfile::tempdir().unwrap();
        let h = hasher(dir.path(), "true");
        assert!(h.health_check().await.unwrap());
    }

    #[test]
    fn test_accepts_only_listed_types() {
        let h = CommandHasher::new("urn:test", "x", png());
        assert!(h.accepts(&MediaType::new("image/png")));
        assert!(!h.accepts(&MediaType::new("image/jpeg")));
        assert!(!h.accepts(&MediaType::unknown()));
    }

    #[test]
    fn test_resolve_bare_name_on_path() {
        assert!(resolve_command(Path::new("sh")).is_some());
        assert!(resolve_command(Path::new("definitely-not-a-real-hasher")).is_none());
    }
}
