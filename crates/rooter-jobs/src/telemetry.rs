//! Tracing subscriber setup shared by the rooter binaries.
//!
//! Environment variables:
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   LOG_FILE    - path to log file (optional, enables daily-rolling file logging)
//!   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
//!   RUST_LOG    - standard env filter (default supplied by the binary)

use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default `RUST_LOG` for `rooter-worker`. Library crates stay at INFO/WARN
/// so hasher, lock and skipped-row warnings reach the operator.
pub const WORKER_LOG_FILTER: &str =
    "rooter_worker=info,rooter_jobs=info,rooter_db=info,rooter_search=warn";

/// Default `RUST_LOG` for `rooter-api`.
pub const API_LOG_FILTER: &str =
    "rooter_api=info,rooter_jobs=info,rooter_db=info,rooter_search=warn,tower_http=info";

/// Parse `LOG_ANSI`. Anything unrecognised leaves colour detection automatic.
fn ansi_override(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process when file
/// logging is enabled, or buffered lines are lost on exit.
pub fn init_tracing(default_filter: &str, default_file_name: &str) -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = ansi_override(std::env::var("LOG_ANSI").ok().as_deref());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(default_file_name);
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // Files get plain text unless LOG_ANSI asks otherwise.
            let mut layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn test_ansi_override() {
        assert_eq!(ansi_override(Some("true")), Some(true));
        assert_eq!(ansi_override(Some("1")), Some(true));
        assert_eq!(ansi_override(Some(" FALSE ")), Some(false));
        assert_eq!(ansi_override(Some("0")), Some(false));
        assert_eq!(ansi_override(Some("auto")), None);
        assert_eq!(ansi_override(None), None);
    }

    #[test]
    fn test_default_filters_cover_library_crates() {
        for filter in [WORKER_LOG_FILTER, API_LOG_FILTER] {
            assert!(EnvFilter::try_new(filter).is_ok(), "{}", filter);
            for target in ["rooter_jobs=", "rooter_db=", "rooter_search="] {
                assert!(filter.contains(target), "{} missing {}", filter, target);
            }
        }
        assert!(WORKER_LOG_FILTER.contains("rooter_worker=info"));
        assert!(API_LOG_FILTER.contains("tower_http=info"));
    }
}
