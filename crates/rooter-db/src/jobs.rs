//! Job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use rooter_core::{Error, Job, JobRepository, JobResult, JobStatus, MatchHit, QueueStats, Result};

const JOB_COLUMNS: &str = "id, status::text AS status, contact, requested_at, claimed_at, completed_at";

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let status: String = row.get("status");
        let status = JobStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("unknown job status '{}'", status)))?;
        Ok(Job {
            id: row.get("id"),
            status,
            contact: row.get("contact"),
            requested_at: row.get("requested_at"),
            claimed_at: row.get("claimed_at"),
            completed_at: row.get("completed_at"),
        })
    }

    fn parse_result_row(row: sqlx::postgres::PgRow) -> JobResult {
        let distance: i32 = row.get("distance");
        JobResult {
            id: row.get("id"),
            job_id: row.get("job_id"),
            work_id: row.get("work_id"),
            work_title: row.get("work_title"),
            namespace: row.get("namespace"),
            distance: distance.max(0) as u32,
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, id: Uuid, contact: Option<&str>) -> Result<Job> {
        let row = sqlx::query(&format!(
            "INSERT INTO job (id, status, contact, requested_at)
             VALUES ($1, 'pending'::job_status, $2, $3)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(contact)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_job_row(row)
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>> {
        // One statement: rows locked by a concurrent claimer are skipped, never
        // double-claimed.
        let rows = sqlx::query(&format!(
            "UPDATE job
             SET status = 'processing'::job_status, claimed_at = $1
             WHERE id IN (
                 SELECT id FROM job
                 WHERE status = 'pending'::job_status
                 ORDER BY requested_at ASC, id ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut jobs = rows
            .into_iter()
            .map(Self::parse_job_row)
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));

        debug!(
            subsystem = "db",
            component = "jobs",
            op = "claim_batch",
            batch_size = jobs.len(),
            "Claimed pending jobs"
        );
        Ok(jobs)
    }

    async fn record_results(
        &self,
        job_id: Uuid,
        namespace: &str,
        hits: &[MatchHit],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Row lock holds off complete() and requeue_stale() until the insert commits.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status::text FROM job WHERE id = $1 FOR UPDATE")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let status = status.ok_or(Error::JobNotFound(job_id))?;
        if status != JobStatus::Processing.as_str() {
            return Err(Error::InvalidInput(format!(
                "job {} is {}, results are only recorded while processing",
                job_id, status
            )));
        }

        if hits.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();

        for hit in hits {
            sqlx::query(
                "INSERT INTO job_result (id, job_id, work_id, namespace, distance, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::now_v7())
            .bind(job_id)
            .bind(hit.work_id)
            .bind(namespace)
            .bind(hit.distance as i32)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(hits.len() as u64)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job SET status = 'done'::job_status, completed_at = $1
             WHERE id = $2 AND status = 'processing'::job_status",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn results(&self, job_id: Uuid) -> Result<Vec<JobResult>> {
        let rows = sqlx::query(
            "SELECT r.id, r.job_id, r.work_id, w.title AS work_title, r.namespace,
                    r.distance, r.created_at
             FROM job_result r
             LEFT JOIN work w ON w.id = r.work_id
             WHERE r.job_id = $1
             ORDER BY r.distance ASC, r.work_id ASC, r.id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_result_row).collect())
    }

    async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM job
             WHERE status = 'processing'::job_status AND claimed_at < $1
             FOR UPDATE",
        )
        .bind(claimed_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if ids.is_empty() {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(0);
        }

        sqlx::query("DELETE FROM job_result WHERE job_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "UPDATE job SET status = 'pending'::job_status, claimed_at = NULL
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "jobs",
            op = "requeue_stale",
            requeued = ids.len(),
            "Requeued stale processing jobs"
        );
        Ok(ids.len() as u64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'done') AS done
             FROM job",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            done: row.get::<i64, _>("done"),
        })
    }
}
