use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::job::{Job, JobStatus, JobType, DEFAULT_RETRIES};

const JOB_COLUMNS: &str = "id, job_type, queue, status, payload, created_at, scheduled_at, \
     started_at, completed_at, worker_id, error, retries";

/// Durable store of scheduled jobs. The source of truth for when work is due.
///
/// No deduplication is promised: a job may be dispatched more than once, so
/// handlers must be idempotent.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<Uuid, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Pending jobs with `scheduled_at <= now`, oldest first.
    async fn get_jobs_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Atomically move up to `limit` due pending jobs to `active`, recording
    /// the claiming worker. Concurrent claimers never receive the same job.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;

    /// Move a job's due time in place, preserving its id and payload.
    /// A completed or failed job becomes pending again; an active one stays active.
    async fn reschedule_job(
        &self,
        job_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Returns `false` when the job was already gone.
    async fn delete_job(&self, job_id: Uuid) -> Result<bool, StoreError>;

    async fn complete_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Spend one retry. The job returns to `pending` at `retry_at` while
    /// budget remains, otherwise it becomes `failed`.
    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Return an active job to `pending` with a new due time, without
    /// spending a retry.
    async fn requeue_job(&self, job_id: Uuid, scheduled_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Return an active job to `pending` after a failed dispatch.
    async fn release_job(&self, job_id: Uuid) -> Result<(), StoreError>;

    /// Return active jobs claimed before `started_before` to `pending`.
    async fn release_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;

    Ok(Job {
        id: row.try_get("id")?,
        job_type: job_type
            .parse::<JobType>()
            .map_err(|_| StoreError::Corrupt(format!("unknown job type '{job_type}'")))?,
        queue: row.try_get("queue")?,
        status: status
            .parse::<JobStatus>()
            .map_err(|_| StoreError::Corrupt(format!("unknown job status '{status}'")))?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        worker_id: row.try_get("worker_id")?,
        error: row.try_get("error")?,
        retries: row.try_get("retries")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &Job) -> Result<Uuid, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, queue, status, payload, created_at, scheduled_at, retries)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.as_ref())
        .bind(&job.queue)
        .bind(job.status.as_ref())
        .bind(&job.payload)
        .bind(job.created_at)
        .bind(job.scheduled_at)
        .bind(job.retries)
        .execute(&self.pool)
        .await?;

        Ok(job.id)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_jobs_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'pending' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'active', started_at = $1, worker_id = $2
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending' AND scheduled_at <= $1
                ORDER BY scheduled_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(worker_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn reschedule_job(
        &self,
        job_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET scheduled_at = $2,
                status = CASE WHEN status = 'active' THEN 'active' ELSE 'pending' END,
                completed_at = CASE WHEN status = 'active' THEN completed_at ELSE NULL END,
                retries = CASE WHEN status = 'failed' THEN $3 ELSE retries END
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(scheduled_at)
        .bind(DEFAULT_RETRIES)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'complete', completed_at = $2, error = NULL
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET retries = retries - 1,
                error = $2,
                status = CASE WHEN retries - 1 > 0 THEN 'pending' ELSE 'failed' END,
                scheduled_at = CASE WHEN retries - 1 > 0 THEN $3 ELSE scheduled_at END,
                completed_at = CASE WHEN retries - 1 > 0 THEN NULL ELSE NOW() END,
                started_at = NULL,
                worker_id = NULL
            WHERE id = $1 AND status = 'active'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(error)
        .bind(retry_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn requeue_job(&self, job_id: Uuid, scheduled_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', scheduled_at = $2, started_at = NULL, worker_id = NULL
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(job_id)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', started_at = NULL, worker_id = NULL
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', started_at = NULL, worker_id = NULL
            WHERE status = 'active' AND started_at < $1
            "#,
        )
        .bind(started_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
