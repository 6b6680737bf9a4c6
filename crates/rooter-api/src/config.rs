//! Server configuration.

use std::path::PathBuf;

use rooter_core::defaults;

/// HTTP server settings.
///
/// | Variable            | Default                |
/// |---------------------|------------------------|
/// | `HOST`              | `0.0.0.0`              |
/// | `PORT`              | `8080`                 |
/// | `MAX_UPLOAD_BYTES`  | 64 MiB                 |
/// | `SEARCH_LIMIT`      | `1000`                 |
/// | `DEFAULT_NAMESPACE` | still-image blockhash  |
/// | `SCRATCH_DIR`       | `/tmp/rooter-queue`    |
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub search_limit: usize,
    /// Namespace searched when a request names neither a namespace nor a type.
    pub default_namespace: String,
    pub scratch_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            search_limit: defaults::SEARCH_LIMIT as usize,
            default_namespace: defaults::BLOCKHASH_NAMESPACE.to_string(),
            scratch_dir: PathBuf::from(defaults::SCRATCH_DIR),
        }
    }
}

impl ApiConfig {
    /// Read overrides from the environment. Unparseable values fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(d.host),
            port: env_parse("PORT").unwrap_or(d.port),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(d.max_upload_bytes),
            search_limit: env_parse("SEARCH_LIMIT").unwrap_or(d.search_limit),
            default_namespace: std::env::var("DEFAULT_NAMESPACE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(d.default_namespace),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.scratch_dir),
        }
    }

    pub fn with_max_upload_bytes(mut self, n: usize) -> Self {
        self.max_upload_bytes = n;
        self
    }

    pub fn with_search_limit(mut self, n: usize) -> Self {
        self.search_limit = n;
        self
    }

    pub fn with_default_namespace(mut self, ns: impl Into<String>) -> Self {
        self.default_namespace = ns.into();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ApiConfig::default();
        assert_eq!(c.port, 8080);
        assert_eq!(c.max_upload_bytes, 64 * 1024 * 1024);
        assert_eq!(c.search_limit, 1000);
        assert_eq!(c.default_namespace, defaults::BLOCKHASH_NAMESPACE);
        assert_eq!(c.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_builders() {
        let c = ApiConfig::default()
            .with_max_upload_bytes(10)
            .with_search_limit(5)
            .with_default_namespace("urn:x")
            .with_scratch_dir("/var/tmp/q");
        assert_eq!(c.max_upload_bytes, 10);
        assert_eq!(c.search_limit, 5);
        assert_eq!(c.default_namespace, "urn:x");
        assert_eq!(c.scratch_dir, PathBuf::from("/var/tmp/q"));
    }
}
