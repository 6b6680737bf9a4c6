//! # rooter-db
//!
//! Storage layer for rooter.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for jobs, fingerprints, and works
//! - An in-memory store implementing the same traits
//! - The scratch directory holding submitted payloads
//!
//! ## Example
//!
//! ```rust,ignore
//! use rooter_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/rooter").await?;
//!     db.migrate().await?;
//!
//!     let stats = db.jobs.stats().await?;
//!     println!("{} jobs pending", stats.pending);
//!     Ok(())
//! }
//! ```

pub mod fingerprints;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod scratch;
pub mod works;

// Test fixtures for integration tests
// Always compiled so tests in other crates can seed a store.
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::PgPool;

// Re-export core types
pub use rooter_core::*;

pub use fingerprints::PgFingerprintRepository;
pub use jobs::PgJobRepository;
pub use memory::MemoryStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use scratch::ScratchDir;
pub use works::PgWorkRepository;

/// Store handle passed to intake, worker, and HTTP state.
#[derive(Clone)]
pub struct Database {
    pool: Option<PgPool>,
    /// Job queue and results.
    pub jobs: Arc<dyn JobRepository>,
    /// Fingerprint store searched by the matcher.
    pub fingerprints: Arc<dyn FingerprintRepository>,
    /// Catalog write path.
    pub works: Arc<dyn WorkRepository>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            jobs: Arc::new(PgJobRepository::new(pool.clone())),
            fingerprints: Arc::new(PgFingerprintRepository::new(pool.clone())),
            works: Arc::new(PgWorkRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a Database backed by a single shared [`MemoryStore`].
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            pool: None,
            jobs: store.clone(),
            fingerprints: store.clone(),
            works: store,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations. A no-op for the in-memory store.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        if let Some(pool) = &self.pool {
            sqlx::migrate!("../../migrations")
                .run(pool)
                .await
                .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        }
        Ok(())
    }

    /// Get the underlying connection pool, if this store is PostgreSQL-backed.
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.pool.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_repositories_share_state() {
        let db = Database::in_memory();
        assert!(db.is_in_memory());
        assert!(db.pool().is_none());

        let (work, manifestation, _) =
            test_fixtures::seed_fingerprint(&db, "Shared", "ns", &"00".repeat(32))
                .await
                .unwrap();
        assert!(db.works.get_work(work).await.unwrap().is_some());
        assert!(db.works.get_manifestation(manifestation).await.unwrap().is_some());
        assert_eq!(db.fingerprints.count("ns").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_store() {
        let db = Database::in_memory();
        let copy = db.clone();
        let id = uuid::Uuid::new_v4();
        db.jobs.create(id, None).await.unwrap();
        assert!(copy.jobs.get(id).await.unwrap().is_some());
    }

    #[cfg(feature = "migrations")]
    #[tokio::test]
    async fn test_migrate_in_memory_is_noop() {
        Database::in_memory().migrate().await.unwrap();
    }
}
