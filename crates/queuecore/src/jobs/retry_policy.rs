//! Optional layer atop the core `Retry`/`Fail` primitives. Not part of the
//! engine's own invariants — a worker is free to call `JobsRepo::retry` and
//! `JobsRepo::fail` directly with its own policy. This module mirrors the
//! classify-then-backoff policy the teacher's own jobs layer ships.
use crate::error::QueueError;
use crate::jobs::policy_decisions::PolicyDecisionsRepo;
use crate::jobs::repo::JobsRepo;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_seconds: i64,
    pub max_seconds: i64,
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_seconds: 2,
            max_seconds: 15 * 60,
            jitter_pct: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

pub fn classify_error(code: &str) -> ErrorClass {
    match code {
        "TIMEOUT" | "DEPENDENCY_DOWN" | "RATE_LIMIT" | "DB_DEADLOCK" | "SERIALIZATION" => {
            ErrorClass::Retryable
        }
        "BAD_PAYLOAD" | "UNKNOWN_JOB_TYPE" => ErrorClass::NonRetryable,
        _ => ErrorClass::Retryable,
    }
}

pub fn next_delay_seconds(attempt_no: i32, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let attempt_no = attempt_no.max(1) as u32;
    let exp = attempt_no.saturating_sub(1);
    let pow2 = 1_i64.checked_shl(exp).unwrap_or(i64::MAX);

    let mut delay = cfg.base_seconds.saturating_mul(pow2);
    if delay > cfg.max_seconds {
        delay = cfg.max_seconds;
    }

    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);
    let jittered = (delay as f64 + jitter).round() as i64;
    jittered.clamp(0, cfg.max_seconds)
}

/// Outcome of driving one failure through the policy, for callers that want
/// to log or assert on which path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Rescheduled,
    Failed,
}

/// Applies the classify+backoff policy to a single failed attempt: retries
/// via the core `Retry` primitive while `attempt <= max_retry` and the error
/// is classified retryable, otherwise calls `Fail`. Every decision is
/// recorded in `ql_policy_decisions` so an operator can reconstruct why a
/// job ended up rescheduled or archived without reading worker logs.
pub struct RetryPolicy {
    cfg: RetryConfig,
    decisions: PolicyDecisionsRepo,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig, decisions: PolicyDecisionsRepo) -> Self {
        Self { cfg, decisions }
    }

    pub async fn on_failure(
        &self,
        ct: &CancellationToken,
        jobs: &JobsRepo,
        job_id: Uuid,
        payload_json: serde_json::Value,
        error_code: &str,
        error_message: &str,
        attempt_no: i32,
        max_retry: i32,
    ) -> Result<Decision, QueueError> {
        let class = classify_error(error_code);
        let can_retry = class == ErrorClass::Retryable && attempt_no <= max_retry;

        let decision = if can_retry {
            let mut rng = StdRng::from_entropy();
            let delay_secs = next_delay_seconds(attempt_no, &self.cfg, &mut rng);
            let run_at = Utc::now() + chrono::Duration::seconds(delay_secs);

            jobs.retry(ct, job_id, attempt_no, run_at, payload_json, error_message)
                .await?;
            Decision::Rescheduled
        } else {
            jobs.fail(ct, job_id, error_message).await?;
            Decision::Failed
        };

        let (decision_str, reason_code) = match decision {
            Decision::Rescheduled => ("rescheduled", error_code),
            Decision::Failed => ("failed", error_code),
        };
        if let Err(e) = self
            .decisions
            .insert_decision(job_id, decision_str, reason_code)
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "failed to record policy decision");
        }

        Ok(decision)
    }
}
