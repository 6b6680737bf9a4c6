//! Namespace registry and its YAML configuration.
//!
//! The registry maps each hasher namespace to its implementation and answers
//! "which namespaces accept this media type". Iteration is always in
//! namespace order so dispatch is deterministic.
//!
//! ```yaml
//! hashers:
//!   - namespace: http://videorooter.org/ns/blockhash
//!     command: blockhash
//!     accepted_types: [image/png, image/jpeg]
//!     max_distance: 10
//!   - namespace: http://videorooter.org/ns/x-blockhash-video-cv
//!     command: /usr/local/bin/blockhash-video
//!     args: ["--frames", "16"]
//!     accepted_types: [video/mp4, video/mpeg, video/ogg, video/webm]
//!     max_distance: 40
//!     hash_bits: 256
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use rooter_core::defaults;
use rooter_core::{Error, Hasher, MediaType, Result};
use rooter_search::NamespacePolicy;

use crate::hasher::CommandHasher;

/// Registry mapping namespaces to hashers.
#[derive(Clone, Default)]
pub struct HasherRegistry {
    hashers: BTreeMap<String, Arc<dyn Hasher>>,
}

impl HasherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hasher. Replaces any existing hasher for the same namespace.
    ///
    /// Rejects hashers that claim the unknown media type, since unrecognized
    /// content must never be dispatched.
    pub fn register(&mut self, hasher: Arc<dyn Hasher>) -> Result<()> {
        if hasher.namespace().trim().is_empty() {
            return Err(Error::Config("hasher namespace must not be empty".to_string()));
        }
        if hasher.accepted_types().iter().any(MediaType::is_unknown) {
            return Err(Error::Config(format!(
                "{}: cannot accept application/octet-stream",
                hasher.namespace()
            )));
        }
        self.hashers.insert(hasher.namespace().to_string(), hasher);
        Ok(())
    }

    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn Hasher>> {
        self.hashers.get(namespace)
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<&str> {
        self.hashers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.hashers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashers.is_empty()
    }

    /// Every hasher accepting `media_type`, in namespace order.
    pub fn for_media_type(&self, media_type: &MediaType) -> Vec<Arc<dyn Hasher>> {
        self.hashers
            .values()
            .filter(|h| h.accepts(media_type))
            .cloned()
            .collect()
    }

    /// Search parameters for `namespace`.
    pub fn policy(&self, namespace: &str) -> Option<NamespacePolicy> {
        self.get(namespace).map(|h| NamespacePolicy::of(h.as_ref()))
    }

    /// Policy of the first namespace (sorted) accepting `media_type`.
    pub fn policy_for_media_type(&self, media_type: &MediaType) -> Option<NamespacePolicy> {
        self.hashers
            .values()
            .find(|h| h.accepts(media_type))
            .map(|h| NamespacePolicy::of(h.as_ref()))
    }

    /// Run health checks on all registered hashers.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (namespace, hasher) in &self.hashers {
            let healthy = hasher.health_check().await.unwrap_or(false);
            results.insert(namespace.clone(), healthy);
        }
        results
    }

    /// The two blockhash namespaces with their default commands.
    pub fn builtin(settings: &HasherSettings) -> Result<Self> {
        let image = CommandHasher::new(
            defaults::BLOCKHASH_NAMESPACE,
            &settings.blockhash_cmd,
            defaults::BLOCKHASH_TYPES.iter().map(|t| MediaType::new(t)),
        )
        .with_max_distance(defaults::BLOCKHASH_MAX_DISTANCE)
        .with_timeout(settings.timeout);

        let video = CommandHasher::new(
            defaults::BLOCKHASH_VIDEO_NAMESPACE,
            &settings.blockhash_video_cmd,
            defaults::BLOCKHASH_VIDEO_TYPES.iter().map(|t| MediaType::new(t)),
        )
        .with_max_distance(defaults::BLOCKHASH_VIDEO_MAX_DISTANCE)
        .with_timeout(settings.timeout);

        let mut registry = Self::new();
        registry.register(Arc::new(image))?;
        registry.register(Arc::new(video))?;
        Ok(registry)
    }

    /// Parse and validate a YAML hasher configuration.
    pub fn from_yaml_str(yaml: &str, timeout: Duration) -> Result<Self> {
        let file: HashersFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid hasher config: {}", e)))?;
        file.validate()?;

        let mut registry = Self::new();
        for spec in file.hashers {
            let hasher = CommandHasher::new(
                spec.namespace,
                spec.command,
                spec.accepted_types.iter().map(|t| MediaType::new(t)),
            )
            .with_args(spec.args)
            .with_hash_bits(spec.hash_bits)
            .with_max_distance(spec.max_distance)
            .with_timeout(timeout);
            registry.register(Arc::new(hasher))?;
        }
        Ok(registry)
    }

    pub fn from_yaml_file(path: &Path, timeout: Duration) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml, timeout)
    }

    /// Build from `settings`: the YAML file when configured, else the built-ins.
    pub fn from_settings(settings: &HasherSettings) -> Result<Self> {
        let registry = match &settings.config_path {
            Some(path) => Self::from_yaml_file(path, settings.timeout)?,
            None => Self::builtin(settings)?,
        };
        info!(
            subsystem = "jobs",
            component = "registry",
            namespaces = ?registry.namespaces(),
            from_file = settings.config_path.is_some(),
            "Hasher registry loaded"
        );
        Ok(registry)
    }
}

impl std::fmt::Debug for HasherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HasherRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

/// Where hashers come from and how long each invocation may take.
#[derive(Debug, Clone)]
pub struct HasherSettings {
    /// YAML registry file; the built-in blockhash namespaces when unset.
    pub config_path: Option<std::path::PathBuf>,
    pub blockhash_cmd: String,
    pub blockhash_video_cmd: String,
    pub timeout: Duration,
}

impl Default for HasherSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            blockhash_cmd: defaults::BLOCKHASH_CMD.to_string(),
            blockhash_video_cmd: defaults::BLOCKHASH_VIDEO_CMD.to_string(),
            timeout: Duration::from_secs(defaults::HASHER_TIMEOUT_SECS),
        }
    }
}

impl HasherSettings {
    /// Create settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HASHERS_CONFIG` | unset | YAML registry file |
    /// | `BLOCKHASH_CMD` | `blockhash` | Image hasher command |
    /// | `BLOCKHASH_VIDEO_CMD` | `blockhash-video` | Video hasher command |
    /// | `HASHER_TIMEOUT_SECS` | `60` | Per-invocation timeout |
    pub fn from_env() -> Self {
        let config_path = std::env::var("HASHERS_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(std::path::PathBuf::from);

        let timeout_secs = std::env::var("HASHER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::HASHER_TIMEOUT_SECS)
            .max(1);

        let settings = Self {
            config_path,
            blockhash_cmd: std::env::var("BLOCKHASH_CMD")
                .unwrap_or_else(|_| defaults::BLOCKHASH_CMD.to_string()),
            blockhash_video_cmd: std::env::var("BLOCKHASH_VIDEO_CMD")
                .unwrap_or_else(|_| defaults::BLOCKHASH_VIDEO_CMD.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };
        debug!(subsystem = "jobs", component = "registry", ?settings, "Hasher settings");
        settings
    }

    pub fn with_config_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HashersFile {
    hashers: Vec<HasherSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HasherSpec {
    namespace: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    accepted_types: Vec<String>,
    max_distance: u32,
    #[serde(default = "default_hash_bits")]
    hash_bits: u32,
}

fn default_hash_bits() -> u32 {
    defaults::HASH_BITS
}

impl HashersFile {
    fn validate(&self) -> Result<()> {
        if self.hashers.is_empty() {
            return Err(Error::Config("hasher config lists no hashers".to_string()));
        }
        let mut seen = HashSet::new();
        for spec in &self.hashers {
            let ns = spec.namespace.trim();
            if ns.is_empty() {
                return Err(Error::Config("hasher namespace must not be empty".to_string()));
            }
            if !seen.insert(ns) {
                return Err(Error::Config(format!("duplicate namespace {}", ns)));
            }
            if spec.command.trim().is_empty() {
                return Err(Error::Config(format!("{}: command must not be empty", ns)));
            }
            if spec.accepted_types.is_empty() {
                return Err(Error::Config(format!("{}: accepted_types is empty", ns)));
            }
            if spec
                .accepted_types
                .iter()
                .any(|t| MediaType::new(t).is_unknown())
            {
                return Err(Error::Config(format!(
                    "{}: cannot accept application/octet-stream",
                    ns
                )));
            }
            if spec.hash_bits == 0 || spec.hash_bits % 8 != 0 {
                return Err(Error::Config(format!(
                    "{}: hash_bits must be a positive multiple of 8",
                    ns
                )));
            }
            if spec.max_distance > spec.hash_bits {
                return Err(Error::Config(format!(
                    "{}: max_distance {} exceeds hash_bits {}",
                    ns, spec.max_distance, spec.hash_bits
                )));
            }
        }
        Ok(())
    }
}
