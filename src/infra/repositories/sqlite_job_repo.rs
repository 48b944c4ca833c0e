use crate::domain::{models::job::Job, ports::JobRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use chrono::Utc;

/// Outbox write for use inside another repository's transaction.
pub(crate) async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO jobs (id, job_type, payload, execute_at, status, error_message, attempts, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
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

pub struct SqliteJobRepo {
    pool: SqlitePool,
}

impl SqliteJobRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }
}

#[async_trait]
impl JobRepository for SqliteJobRepo {
    async fn create(&self, job: &Job) -> Result<Job, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        insert_job(&mut conn, job).await?;
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(&job.id)
            .fetch_one(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    async fn find_pending(&self, limit: i32) -> Result<Vec<Job>, AppError> {
        let now = Utc::now();
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'PROCESSING', attempts = attempts + 1
             WHERE id IN (SELECT id FROM jobs WHERE status = 'PENDING' AND execute_at <= ? ORDER BY execute_at ASC LIMIT ?)
             RETURNING *"
        )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn update_status(&self, id: &str, status: &str, error_message: Option<String>) -> Result<(), AppError> {
        sqlx::query("UPDATE jobs SET status = ?, error_message = ? WHERE id = ?")
            .bind(status)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
