use crate::error::QueueError;
use crate::jobs::model::{Filter, Job, Payload};
use crate::jobs::truncate::truncate_error;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, priority, queue, job_type, payload, uuid, run_at, deadline, \
     timeout, max_retry, retried, locked_at, locked_by, last_error, failed_at, created_at, \
     updated_at";

/// Races `fut` against `ct`'s cancellation. The store round-trip is not
/// aborted mid-flight (sqlx has no cooperative-cancel hook for a bare
/// `PgPool` query) but the caller gets `QueueError::Cancelled` back as soon
/// as the token fires rather than waiting for the query to finish.
async fn run_cancellable<T>(
    ct: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, QueueError>>,
) -> Result<T, QueueError> {
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(QueueError::Cancelled),
        res = fut => res,
    }
}

/// Speaks SQL against the two-table schema (running + result) and exposes
/// the queue engine's public operations. Table names are derived from the
/// configured prefix and validated at `QueueConfig::from_env` time, so they
/// are safe to interpolate into otherwise-parameterized queries here.
#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
    running_table: String,
    result_table: String,
    lease_window: Duration,
}

impl JobsRepo {
    pub fn new(pool: PgPool, running_table: String, result_table: String, lease_window_secs: i64) -> Self {
        Self {
            pool,
            running_table,
            result_table,
            lease_window: Duration::seconds(lease_window_secs),
        }
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Writes one row to the running table. `last_error`, `failed_at`,
    /// `locked_at`, `locked_by` and `retried` are forced to empty/zero
    /// regardless of what the caller's `job` carries — only the caller's
    /// `priority`, `queue`, `job_type`, `payload`, `uuid`, `run_at`,
    /// `deadline`, `timeout` and `max_retry` survive the insert.
    pub async fn enqueue(&self, ct: &CancellationToken, job: &Job) -> Result<Uuid, QueueError> {
        run_cancellable(ct, async {
            let sql = format!(
                r#"
                INSERT INTO {table} (
                    priority, queue, job_type, payload, uuid, run_at, deadline, timeout, max_retry,
                    retried, locked_at, locked_by, last_error, failed_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, NULL, NULL, NULL, NULL, now(), now())
                RETURNING id
                "#,
                table = self.running_table
            );

            let id: Uuid = sqlx::query_scalar(&sql)
                .bind(job.priority)
                .bind(&job.queue)
                .bind(&job.job_type)
                .bind(&job.payload)
                .bind(&job.uuid)
                .bind(job.run_at)
                .bind(job.deadline)
                .bind(job.timeout)
                .bind(job.max_retry)
                .fetch_one(&self.pool)
                .await?;

            tracing::debug!(job_id = %id, queue = %job.queue, "enqueued job");
            Ok(id)
        })
        .await
    }

    // ----------------------------
    // Fetch
    // ----------------------------

    /// Atomically selects and leases at most one eligible row, ordered by
    /// ascending priority then `run_at` then `id`. Uses `FOR UPDATE SKIP
    /// LOCKED` so concurrent callers never contend on the same candidate.
    pub async fn fetch(
        &self,
        ct: &CancellationToken,
        worker_id: &str,
        filter: &Filter,
    ) -> Result<Option<Job>, QueueError> {
        let mut rows = self.fetch_batch(ct, worker_id, filter, 1).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// Leases up to `limit` eligible rows in one round trip. Preserves the
    /// same ordering and per-row exclusivity guarantee as `fetch`.
    pub async fn fetch_batch(
        &self,
        ct: &CancellationToken,
        worker_id: &str,
        filter: &Filter,
        limit: i64,
    ) -> Result<Vec<Job>, QueueError> {
        run_cancellable(ct, async {
            let mut tx = self.pool.begin().await?;

            let mut select_sql = format!(
                r#"
                SELECT {cols} FROM {table}
                WHERE run_at <= now()
                  AND (deadline IS NULL OR deadline >= now())
                  AND last_error IS NULL
                  AND failed_at IS NULL
                  AND (locked_at IS NULL OR locked_by IS NULL
                       OR locked_at < now() - ($1 * interval '1 second'))
                "#,
                cols = JOB_COLUMNS,
                table = self.running_table
            );

            let mut arg_idx = 2;
            if filter.queue.is_some() {
                select_sql.push_str(&format!(" AND queue = ${arg_idx}"));
                arg_idx += 1;
            }
            if filter.priority_min.is_some() {
                select_sql.push_str(&format!(" AND priority >= ${arg_idx}"));
                arg_idx += 1;
            }
            if filter.priority_max.is_some() {
                select_sql.push_str(&format!(" AND priority <= ${arg_idx}"));
                arg_idx += 1;
            }
            select_sql.push_str(&format!(
                " ORDER BY priority ASC, run_at ASC, id ASC FOR UPDATE SKIP LOCKED LIMIT ${arg_idx}"
            ));

            let mut query =
                sqlx::query_as::<_, Job>(&select_sql).bind(self.lease_window.num_seconds());
            if let Some(q) = &filter.queue {
                query = query.bind(q);
            }
            if let Some(min) = filter.priority_min {
                query = query.bind(min);
            }
            if let Some(max) = filter.priority_max {
                query = query.bind(max);
            }
            query = query.bind(limit);

            let candidates = query.fetch_all(&mut *tx).await?;

            if candidates.is_empty() {
                tx.commit().await?;
                return Ok(Vec::new());
            }

            let ids: Vec<Uuid> = candidates.iter().map(|j| j.id).collect();
            let lease_sql = format!(
                r#"
                UPDATE {table}
                SET locked_at = now(), locked_by = $2, updated_at = now(), last_error = NULL
                WHERE id = ANY($1)
                RETURNING {cols}
                "#,
                table = self.running_table,
                cols = JOB_COLUMNS
            );

            let mut leased = sqlx::query_as::<_, Job>(&lease_sql)
                .bind(&ids)
                .bind(worker_id)
                .fetch_all(&mut *tx)
                .await?;

            tx.commit().await?;

            // Preserve the selection order (priority, run_at, id) rather than
            // whatever order the UPDATE ... RETURNING happened to produce.
            leased.sort_by(|a, b| (a.priority, a.run_at, a.id).cmp(&(b.priority, b.run_at, b.id)));

            for job in &leased {
                tracing::debug!(job_id = %job.id, queue = %job.queue, worker_id, "leased job");
            }

            Ok(leased)
        })
        .await
    }

    // ----------------------------
    // Retry
    // ----------------------------

    /// Reschedules a running-table row: new `run_at`/`retried`/`payload`,
    /// records `last_error` (truncated), clears the lease. The row becomes
    /// eligible for `fetch` again once `run_at` arrives.
    pub async fn retry(
        &self,
        ct: &CancellationToken,
        id: Uuid,
        attempt: i32,
        run_at: DateTime<Utc>,
        payload: Value,
        err_msg: &str,
    ) -> Result<(), QueueError> {
        run_cancellable(ct, async {
            let truncated = if err_msg.is_empty() {
                None
            } else {
                Some(truncate_error(err_msg))
            };

            let sql = format!(
                r#"
                UPDATE {table}
                SET retried = $2, run_at = $3, payload = $4, last_error = $5,
                    locked_at = NULL, locked_by = NULL, updated_at = now()
                WHERE id = $1
                "#,
                table = self.running_table
            );

            let result = sqlx::query(&sql)
                .bind(id)
                .bind(attempt)
                .bind(run_at)
                .bind(Payload::new(payload))
                .bind(&truncated)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(QueueError::NotFound { id });
            }

            tracing::debug!(job_id = %id, attempt, "retry scheduled");
            Ok(())
        })
        .await
    }

    // ----------------------------
    // Succeed
    // ----------------------------

    /// Removes a completed row from the running table. Success leaves no
    /// trace in the result table — only terminal failures are archived
    /// there.
    pub async fn succeed(&self, ct: &CancellationToken, id: Uuid) -> Result<(), QueueError> {
        run_cancellable(ct, async {
            let sql = format!("DELETE FROM {table} WHERE id = $1", table = self.running_table);
            let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

            if result.rows_affected() == 0 {
                return Err(QueueError::NotFound { id });
            }

            tracing::debug!(job_id = %id, "job succeeded");
            Ok(())
        })
        .await
    }

    // ----------------------------
    // Fail
    // ----------------------------

    /// Moves a row from the running table to the result table in one
    /// transaction: delete, then insert with `created_at = now()` and the
    /// truncated error. Subsequent `fetch` calls will never see this id.
    pub async fn fail(&self, ct: &CancellationToken, id: Uuid, err_msg: &str) -> Result<(), QueueError> {
        run_cancellable(ct, async {
            let truncated = truncate_error(err_msg);
            let mut tx = self.pool.begin().await?;

            let delete_sql = format!(
                "DELETE FROM {table} WHERE id = $1 RETURNING {cols}",
                table = self.running_table,
                cols = JOB_COLUMNS
            );

            let row = sqlx::query_as::<_, Job>(&delete_sql)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

            let Some(row) = row else {
                return Err(QueueError::NotFound { id });
            };

            let insert_sql = format!(
                r#"
                INSERT INTO {table} (
                    id, priority, queue, job_type, payload, uuid, run_at, deadline, timeout,
                    max_retry, retried, locked_at, locked_by, last_error, failed_at, created_at,
                    updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL, NULL, $12, now(), now(), now())
                "#,
                table = self.result_table
            );

            sqlx::query(&insert_sql)
                .bind(row.id)
                .bind(row.priority)
                .bind(&row.queue)
                .bind(&row.job_type)
                .bind(&row.payload)
                .bind(&row.uuid)
                .bind(row.run_at)
                .bind(row.deadline)
                .bind(row.timeout)
                .bind(row.max_retry)
                .bind(row.retried)
                .bind(&truncated)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::warn!(job_id = %id, "job failed and archived");
            Ok(())
        })
        .await
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, ct: &CancellationToken, id: Uuid) -> Result<Option<Job>, QueueError> {
        run_cancellable(ct, async {
            let sql = format!(
                "SELECT {cols} FROM {table} WHERE id = $1",
                cols = JOB_COLUMNS,
                table = self.running_table
            );
            let job = sqlx::query_as::<_, Job>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(job)
        })
        .await
    }

    pub async fn get_result(&self, ct: &CancellationToken, id: Uuid) -> Result<Option<Job>, QueueError> {
        run_cancellable(ct, async {
            let sql = format!(
                "SELECT {cols} FROM {table} WHERE id = $1",
                cols = JOB_COLUMNS,
                table = self.result_table
            );
            let job = sqlx::query_as::<_, Job>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(job)
        })
        .await
    }

    /// Lists rows from `table` newest-first with an optional queue filter,
    /// an optional inclusive priority range, and keyset pagination: when
    /// both `cursor_created_at` and `cursor_id` are given, only rows
    /// strictly older than that `(created_at, id)` pair are returned, so
    /// a caller can page through the full table by re-submitting the last
    /// row's `(created_at, id)` as the next cursor.
    async fn list_paginated(
        &self,
        ct: &CancellationToken,
        table: &str,
        queue: Option<&str>,
        priority_min: Option<i32>,
        priority_max: Option<i32>,
        limit: i64,
        cursor_created_at: Option<DateTime<Utc>>,
        cursor_id: Option<Uuid>,
    ) -> Result<Vec<Job>, QueueError> {
        run_cancellable(ct, async {
            let limit = limit.clamp(1, 500);
            let cursor = cursor_created_at.zip(cursor_id);

            let mut sql = format!("SELECT {JOB_COLUMNS} FROM {table} WHERE 1 = 1");
            let mut arg_idx = 1;
            if queue.is_some() {
                sql.push_str(&format!(" AND queue = ${arg_idx}"));
                arg_idx += 1;
            }
            if priority_min.is_some() {
                sql.push_str(&format!(" AND priority >= ${arg_idx}"));
                arg_idx += 1;
            }
            if priority_max.is_some() {
                sql.push_str(&format!(" AND priority <= ${arg_idx}"));
                arg_idx += 1;
            }
            if cursor.is_some() {
                sql.push_str(&format!(
                    " AND (created_at, id) < (${arg_idx}, ${})",
                    arg_idx + 1
                ));
                arg_idx += 2;
            }
            sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ${arg_idx}"));

            let mut query = sqlx::query_as::<_, Job>(&sql);
            if let Some(q) = queue {
                query = query.bind(q);
            }
            if let Some(min) = priority_min {
                query = query.bind(min);
            }
            if let Some(max) = priority_max {
                query = query.bind(max);
            }
            if let Some((created_at, id)) = cursor {
                query = query.bind(created_at).bind(id);
            }
            query = query.bind(limit);

            Ok(query.fetch_all(&self.pool).await?)
        })
        .await
    }

    /// Lists running-table rows. See `list_paginated` for the filter and
    /// cursor-pagination contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_jobs(
        &self,
        ct: &CancellationToken,
        queue: Option<&str>,
        priority_min: Option<i32>,
        priority_max: Option<i32>,
        limit: i64,
        cursor_created_at: Option<DateTime<Utc>>,
        cursor_id: Option<Uuid>,
    ) -> Result<Vec<Job>, QueueError> {
        let table = self.running_table.clone();
        self.list_paginated(
            ct,
            &table,
            queue,
            priority_min,
            priority_max,
            limit,
            cursor_created_at,
            cursor_id,
        )
        .await
    }

    /// Lists result-table rows. See `list_paginated` for the filter and
    /// cursor-pagination contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_results(
        &self,
        ct: &CancellationToken,
        queue: Option<&str>,
        priority_min: Option<i32>,
        priority_max: Option<i32>,
        limit: i64,
        cursor_created_at: Option<DateTime<Utc>>,
        cursor_id: Option<Uuid>,
    ) -> Result<Vec<Job>, QueueError> {
        let table = self.result_table.clone();
        self.list_paginated(
            ct,
            &table,
            queue,
            priority_min,
            priority_max,
            limit,
            cursor_created_at,
            cursor_id,
        )
        .await
    }

    // ----------------------------
    // Metrics snapshot (for /metrics)
    // ----------------------------

    /// Returns (running_count, leased_count, result_count).
    pub async fn metrics_snapshot(&self, ct: &CancellationToken) -> Result<(i64, i64, i64), QueueError> {
        run_cancellable(ct, async {
            let running_sql = format!("SELECT COUNT(*) FROM {}", self.running_table);
            let leased_sql = format!(
                "SELECT COUNT(*) FROM {} WHERE locked_by IS NOT NULL AND locked_at >= now() - ($1 * interval '1 second')",
                self.running_table
            );
            let result_sql = format!("SELECT COUNT(*) FROM {}", self.result_table);

            let running: i64 = sqlx::query_scalar(&running_sql).fetch_one(&self.pool).await?;
            let leased: i64 = sqlx::query_scalar(&leased_sql)
                .bind(self.lease_window.num_seconds())
                .fetch_one(&self.pool)
                .await?;
            let result: i64 = sqlx::query_scalar(&result_sql).fetch_one(&self.pool).await?;

            Ok((running, leased, result))
        })
        .await
    }

    // ----------------------------
    // Administrative reset
    // ----------------------------

    /// Truncates both tables (and, transitively, the attempts/policy log
    /// tables). Used only by tests and administrative reset.
    pub async fn clear_all(&self, ct: &CancellationToken) -> Result<(), QueueError> {
        run_cancellable(ct, async {
            let sql = format!(
                "TRUNCATE {running}, {result}, ql_attempts, ql_policy_decisions",
                running = self.running_table,
                result = self.result_table
            );
            sqlx::query(&sql).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    /// Releases the underlying connection pool. Idempotent: closing an
    /// already-closed pool is a no-op in sqlx. A cancelled token simply
    /// short-circuits the wait; the pool close is not itself abortable.
    pub async fn close(&self, ct: &CancellationToken) {
        let _ = run_cancellable(ct, async {
            self.pool.close().await;
            Ok::<(), QueueError>(())
        })
        .await;
    }
}
