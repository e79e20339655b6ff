use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Ambient audit log: one row per fetch-execute cycle, independent of
/// whether the job's own row currently lives in the running or result
/// table. Not part of the core invariants — purely observability.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobAttempt {
    pub id: Uuid,
    pub job_id: Uuid,
    pub attempt_no: i32,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub status: String,

    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub worker_id: String,
}

pub enum AttemptStatus {
    Running,
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Running => "running",
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct AttemptsRepo {
    pool: PgPool,
}

impl AttemptsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn start_attempt(&self, job_id: Uuid, worker_id: &str) -> anyhow::Result<JobAttempt> {
        let status = AttemptStatus::Running.as_str();

        let attempt = sqlx::query_as::<_, JobAttempt>(
            r#"
            INSERT INTO ql_attempts (job_id, attempt_no, status, worker_id)
            VALUES (
              $1,
              COALESCE((SELECT MAX(attempt_no) FROM ql_attempts WHERE job_id = $1), 0) + 1,
              $2,
              $3
            )
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }

    pub async fn finish_succeeded(&self, attempt_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ql_attempts
            SET status = $2, finished_at = now()
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(AttemptStatus::Succeeded.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn finish_failed(
        &self,
        attempt_id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ql_attempts
            SET status = $2, finished_at = now(), error_code = $3, error_message = $4
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(AttemptStatus::Failed.as_str())
        .bind(error_code)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_attempts_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<JobAttempt>> {
        let rows = sqlx::query_as::<_, JobAttempt>(
            r#"
            SELECT * FROM ql_attempts
            WHERE job_id = $1
            ORDER BY attempt_no ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
