use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Ambient log the `retry_policy` layer writes to whenever it decides to
/// reschedule or fail a job, so an operator can reconstruct why a job ended
/// up where it did without reading worker logs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PolicyDecisionRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub decision: String,
    pub reason_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PolicyDecisionsRepo {
    pool: PgPool,
}

impl PolicyDecisionsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_decision(
        &self,
        job_id: Uuid,
        decision: &str,
        reason_code: &str,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO ql_policy_decisions (id, job_id, decision, reason_code)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(job_id)
        .bind(decision)
        .bind(reason_code)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<PolicyDecisionRow>> {
        let rows = sqlx::query_as::<_, PolicyDecisionRow>(
            r#"
            SELECT id, job_id, decision, reason_code, created_at
            FROM ql_policy_decisions
            WHERE job_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
