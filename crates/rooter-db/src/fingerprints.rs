//! Fingerprint store implementation.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use rooter_core::{Error, FingerprintCandidate, FingerprintRepository, Result};

/// PostgreSQL implementation of FingerprintRepository.
pub struct PgFingerprintRepository {
    pool: Pool<Postgres>,
}

impl PgFingerprintRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_candidate_row(row: sqlx::postgres::PgRow) -> FingerprintCandidate {
        FingerprintCandidate {
            fingerprint_id: row.get("id"),
            manifestation_id: row.get("manifestation_id"),
            work_id: row.get("work_id"),
            work_title: row.get("title"),
            hash: row.get("hash"),
        }
    }
}

#[async_trait]
impl FingerprintRepository for PgFingerprintRepository {
    async fn upsert(&self, manifestation_id: Uuid, namespace: &str, hash: &str) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO fingerprint (id, manifestation_id, namespace, hash, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (manifestation_id, namespace)
             DO UPDATE SET hash = EXCLUDED.hash, updated_at = EXCLUDED.updated_at
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(manifestation_id)
        .bind(namespace)
        .bind(hash.trim().to_ascii_lowercase())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    fn scan_namespace<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxStream<'a, Result<FingerprintCandidate>> {
        sqlx::query(
            "SELECT f.id, f.manifestation_id, m.work_id, w.title, f.hash
             FROM fingerprint f
             JOIN manifestation m ON m.id = f.manifestation_id
             JOIN work w ON w.id = m.work_id
             WHERE f.namespace = $1",
        )
        .bind(namespace)
        .fetch(&self.pool)
        .map(|row| row.map(Self::parse_candidate_row).map_err(Error::Database))
        .boxed()
    }

    async fn count(&self, namespace: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM fingerprint WHERE namespace = $1")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
