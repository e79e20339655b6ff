use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// Belt-and-suspenders maintenance helpers. `Fetch` already treats a stale
/// lease as eligible on its own, so nothing here is required for
/// correctness — `count_stale_leases` exists only so the worker's
/// background reaper task has something to log.
#[derive(Clone)]
pub struct MaintenanceRepo {
    pool: PgPool,
    running_table: String,
    result_table: String,
}

impl MaintenanceRepo {
    pub fn new(pool: PgPool, running_table: String, result_table: String) -> Self {
        Self {
            pool,
            running_table,
            result_table,
        }
    }

    pub async fn count_stale_leases(&self, lease_window_secs: i64) -> anyhow::Result<i64> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM {table}
            WHERE locked_by IS NOT NULL
              AND locked_at IS NOT NULL
              AND locked_at < now() - ($1 * interval '1 second')
            "#,
            table = self.running_table
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(lease_window_secs)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Delete result-table rows (and their audit history) older than
    /// `cutoff`. Administrative housekeeping only; no core invariant
    /// depends on result-table rows ever being pruned.
    pub async fn prune_old_results(&self, cutoff: DateTime<Utc>, batch: i64) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        let select_sql = format!(
            r#"
            SELECT id FROM {table}
            WHERE created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            table = self.result_table
        );

        let job_ids: Vec<uuid::Uuid> = sqlx::query_scalar(&select_sql)
            .bind(cutoff)
            .bind(batch)
            .fetch_all(&mut *tx)
            .await?;

        if job_ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        sqlx::query("DELETE FROM ql_attempts WHERE job_id = ANY($1)")
            .bind(&job_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM ql_policy_decisions WHERE job_id = ANY($1)")
            .bind(&job_ids)
            .execute(&mut *tx)
            .await?;

        let delete_sql = format!("DELETE FROM {table} WHERE id = ANY($1)", table = self.result_table);
        let deleted = sqlx::query(&delete_sql)
            .bind(&job_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }
}

/// Convenience: compute cutoff like "now - N days"
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
