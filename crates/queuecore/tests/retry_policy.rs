mod common;

use common::{default_repo, no_filter, sample_job, setup_db};
use queuecore::jobs::{Decision, PolicyDecisionsRepo, RetryConfig, RetryPolicy};

fn deterministic_policy(pool: sqlx::PgPool) -> RetryPolicy {
    RetryPolicy::new(
        RetryConfig {
            base_seconds: 1,
            max_seconds: 5,
            jitter_pct: 0.0,
        },
        PolicyDecisionsRepo::new(pool),
    )
}

async fn force_runnable_now(pool: &sqlx::PgPool, id: uuid::Uuid) {
    sqlx::query("UPDATE ql_jobs SET run_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

// S8 — retry policy escalates to Fail once attempts exceed MaxRetry.
#[tokio::test]
async fn s8_retry_policy_escalates_to_fail_after_max_retry_exceeded() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let policy = deterministic_policy(pool.clone());

    let mut job = sample_job();
    job.max_retry = 2;
    let id = repo.enqueue(&common::ct(), &job).await.unwrap();

    // Attempt 1: retryable, attempt_no(1) <= max_retry(2) -> reschedule.
    let decision1 = policy
        .on_failure(&common::ct(), &repo, id, serde_json::json!({}), "TIMEOUT", "t1", 1, 2)
        .await
        .unwrap();
    assert_eq!(decision1, Decision::Rescheduled);
    force_runnable_now(&pool, id).await;

    // Attempt 2: attempt_no(2) <= max_retry(2) -> still reschedule.
    let decision2 = policy
        .on_failure(&common::ct(), &repo, id, serde_json::json!({}), "TIMEOUT", "t2", 2, 2)
        .await
        .unwrap();
    assert_eq!(decision2, Decision::Rescheduled);
    force_runnable_now(&pool, id).await;

    assert!(repo.get_job(&common::ct(), id).await.unwrap().is_some(), "job must still be running");

    // Attempt 3: attempt_no(3) > max_retry(2) -> terminal failure.
    let decision3 = policy
        .on_failure(&common::ct(), &repo, id, serde_json::json!({}), "TIMEOUT", "final error", 3, 2)
        .await
        .unwrap();
    assert_eq!(decision3, Decision::Failed);

    assert!(repo.get_job(&common::ct(), id).await.unwrap().is_none(), "job must leave the running table");
    let archived = repo.get_result(&common::ct(), id).await.unwrap().expect("result row must exist");
    assert_eq!(archived.last_error.as_deref(), Some("final error"));

    assert!(repo.fetch(&common::ct(), "w", &no_filter()).await.unwrap().is_none());
}

// S9 — a non-retryable error fails immediately, even on attempt 1.
#[tokio::test]
async fn s9_non_retryable_error_fails_immediately() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let policy = deterministic_policy(pool.clone());

    let mut job = sample_job();
    job.max_retry = 10;
    let id = repo.enqueue(&common::ct(), &job).await.unwrap();

    let decision = policy
        .on_failure(&common::ct(), &repo, id, serde_json::json!({}), "BAD_PAYLOAD", "invalid json", 1, 10)
        .await
        .unwrap();

    assert_eq!(decision, Decision::Failed);
    assert!(repo.get_job(&common::ct(), id).await.unwrap().is_none());
    assert!(repo.get_result(&common::ct(), id).await.unwrap().is_some());
}

#[tokio::test]
async fn next_delay_seconds_grows_with_attempt_number_and_respects_cap() {
    use queuecore::jobs::retry_policy::next_delay_seconds;

    let cfg = RetryConfig {
        base_seconds: 1,
        max_seconds: 10,
        jitter_pct: 0.0,
    };
    let mut rng = rand::rngs::mock::StepRng::new(0, 1);

    assert_eq!(next_delay_seconds(1, &cfg, &mut rng), 1);
    assert_eq!(next_delay_seconds(2, &cfg, &mut rng), 2);
    assert_eq!(next_delay_seconds(3, &cfg, &mut rng), 4);
    assert_eq!(next_delay_seconds(10, &cfg, &mut rng), 10, "delay must be capped at max_seconds");
}
