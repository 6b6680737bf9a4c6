//! rooter-api server binary.
//!
//! Environment variables (besides those read by `ApiConfig`, `HasherSettings`
//! and the tracing setup):
//!   DATABASE_URL - PostgreSQL connection string

use anyhow::Context;
use tracing::{info, warn};

use rooter_api::{router, ApiConfig, AppState};
use rooter_core::defaults;
use rooter_db::{Database, ScratchDir};
use rooter_jobs::telemetry::{init_tracing, API_LOG_FILTER};
use rooter_jobs::{HasherRegistry, HasherSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing(API_LOG_FILTER, "rooter-api.log");

    let config = ApiConfig::from_env();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());

    let registry = HasherRegistry::from_settings(&HasherSettings::from_env())
        .context("failed to load hasher registry")?;
    if registry.get(&config.default_namespace).is_none() {
        warn!(
            subsystem = "api",
            namespace = %config.default_namespace,
            "Default namespace is not registered; searches must name a namespace or type"
        );
    }

    ScratchDir::new(config.scratch_dir.clone())
        .validate()
        .await
        .context("scratch directory unusable")?;

    let db = Database::connect(&database_url)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;

    let addr = config.bind_addr();
    let app = router(AppState::new(db, registry, &config));

    info!(subsystem = "api", %addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
