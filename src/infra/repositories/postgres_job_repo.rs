use crate::domain::{models::job::Job, ports::JobRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use chrono::Utc;

/// Outbox write for use inside another repository's transaction.
pub(crate) async fn insert_job(conn: &mut PgConnection, job: &Job) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO jobs (id, job_type, payload, execute_at, status, error_message, attempts, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    )
        .bind(&job.id)
        .bind(job.job_type.as_str())
        .bind(&job.payload)
        .bind(job.execute_at)
        .bind(&job.status)
        .bind(&job.error_message)
        .bind(job.attempts)
        .bind(job.created_at)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;
    Ok(())
}

pub struct PostgresJobRepo {
    pool: PgPool,
}

impl PostgresJobRepo {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl JobRepository for PostgresJobRepo {
    async fn create(&self, job: &Job) -> Result<Job, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        insert_job(&mut conn, job).await?;
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(&job.id)
            .fetch_one(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    async fn find_pending(&self, limit: i32) -> Result<Vec<Job>, AppError> {
        let now = Utc::now();
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'PROCESSING', attempts = attempts + 1
            WHERE id IN (
                SELECT id
                FROM jobs
                WHERE status = 'PENDING' AND execute_at <= $1
                ORDER BY execute_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#
        )
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(jobs)
    }

    async fn update_status(&self, id: &str, status: &str, error_message: Option<String>) -> Result<(), AppError> {
        sqlx::query("UPDATE jobs SET status = $1, error_message = $2 WHERE id = $3")
            .bind(status)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
