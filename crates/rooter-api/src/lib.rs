//! # rooter-api
//!
//! HTTP surface for rooter: submit a file for fingerprinting, poll the job,
//! search stored fingerprints by hash.
//!
//! | Method | Path               | Purpose                          |
//! |--------|--------------------|----------------------------------|
//! | POST   | `/v1/jobs`         | submit raw bytes, returns handle |
//! | GET    | `/v1/jobs/:handle` | poll job, results when done      |
//! | GET    | `/v1/search`       | Hamming search by hex hash       |
//! | GET    | `/health`          | liveness and hasher status       |

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use rooter_db::{Database, ScratchDir};
use rooter_jobs::{HasherRegistry, JobIntake};
use rooter_search::Matcher;

pub use config::ApiConfig;
pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub intake: JobIntake,
    pub registry: Arc<HasherRegistry>,
    pub matcher: Matcher,
    pub default_namespace: String,
}

impl AppState {
    pub fn new(db: Database, registry: HasherRegistry, config: &ApiConfig) -> Self {
        let scratch = ScratchDir::new(config.scratch_dir.clone());
        let intake = JobIntake::new(db.clone(), scratch).with_max_bytes(config.max_upload_bytes);
        let matcher = Matcher::new(db.fingerprints.clone()).with_limit(config.search_limit);
        Self {
            db,
            intake,
            registry: Arc::new(registry),
            matcher,
            default_namespace: config.default_namespace.clone(),
        }
    }
}

/// Build the router. Bodies above the intake maximum are rejected with 413
/// before reaching the handler.
pub fn router(state: AppState) -> Router {
    let max_body = state.intake.max_bytes();
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/jobs", post(handlers::submit_job))
        .route("/v1/jobs/:handle", get(handlers::poll_job))
        .route("/v1/search", get(handlers::search))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
