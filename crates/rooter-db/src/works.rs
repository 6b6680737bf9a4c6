//! Work and manifestation repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use rooter_core::{CreateWorkRequest, Error, Manifestation, MediaType, Result, Work, WorkRepository};

/// PostgreSQL implementation of WorkRepository.
pub struct PgWorkRepository {
    pool: Pool<Postgres>,
}

impl PgWorkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkRepository for PgWorkRepository {
    async fn create_work(&self, req: CreateWorkRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO work (id, title, description, rights_statement, credit, credit_url,
                               collection_url, source_id, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.rights_statement)
        .bind(&req.credit)
        .bind(&req.credit_url)
        .bind(&req.collection_url)
        .bind(&req.source_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get_work(&self, id: Uuid) -> Result<Option<Work>> {
        let row = sqlx::query(
            "SELECT id, title, description, rights_statement, credit, credit_url,
                    collection_url, source_id, updated_at
             FROM work WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| Work {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            rights_statement: row.get("rights_statement"),
            credit: row.get("credit"),
            credit_url: row.get("credit_url"),
            collection_url: row.get("collection_url"),
            source_id: row.get("source_id"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn add_manifestation(
        &self,
        work_id: Uuid,
        url: &str,
        media_type: &MediaType,
    ) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO manifestation (id, work_id, url, media_type) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(work_id)
        .bind(url)
        .bind(media_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get_manifestation(&self, id: Uuid) -> Result<Option<Manifestation>> {
        let row = sqlx::query("SELECT id, work_id, url, media_type FROM manifestation WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|row| Manifestation {
            id: row.get("id"),
            work_id: row.get("work_id"),
            url: row.get("url"),
            media_type: MediaType::new(row.get::<&str, _>("media_type")),
        }))
    }
}
