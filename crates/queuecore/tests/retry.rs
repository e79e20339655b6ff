mod common;

use common::{default_repo, no_filter, read_running_last_error, sample_job, setup_db, within_one_second};
use chrono::{Duration as ChronoDuration, Utc};
use queuecore::jobs::truncate::truncate_error;

// Invariant 2 / S2 — retry reschedules with an empty error message.
#[tokio::test]
async fn retry_reschedules_and_preserves_created_at() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    let enqueued = repo.get_job(&common::ct(), id).await.unwrap().unwrap();

    let run_at = Utc::now() - ChronoDuration::minutes(1);
    repo.retry(&common::ct(), id, 2, run_at, serde_json::json!({"a": "b"}), "").await.unwrap();

    let job = repo.fetch(&common::ct(), "abc", &no_filter()).await.unwrap().expect("should fetch retried job");

    assert_eq!(job.retried, 2);
    assert!(within_one_second(job.run_at, run_at));
    assert_eq!(job.locked_by.as_deref(), Some("abc"));
    assert_eq!(job.last_error, None);
    assert_eq!(job.created_at, enqueued.created_at);
}

// Invariant 3 / S3 — retry with an oversized error message.
#[tokio::test]
async fn retry_truncates_error_and_fetch_masks_it_to_empty() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();

    let run_at = Utc::now() - ChronoDuration::minutes(2);
    let oversized = "a".repeat(8010);
    repo.retry(&common::ct(), id, 2, run_at, serde_json::json!({"a": "b"}), &oversized)
        .await
        .unwrap();

    // Between Retry and the next Fetch, the running row's column is
    // genuinely non-empty and carries the truncation envelope.
    let stored = read_running_last_error(&pool, id).await;
    assert_eq!(stored.as_deref(), Some(truncate_error(&oversized).as_str()));

    let job = repo.fetch(&common::ct(), "abc", &no_filter()).await.unwrap().expect("should fetch");
    assert_eq!(job.last_error, None, "fetch must clear last_error on lease acquisition");
    assert_eq!(job.retried, 2);
}

#[tokio::test]
async fn retry_clears_existing_lease() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    repo.fetch(&common::ct(), "first-worker", &no_filter()).await.unwrap();

    repo.retry(&common::ct(), id, 1, Utc::now() - ChronoDuration::seconds(1), serde_json::json!({}), "")
        .await
        .unwrap();

    let row = repo.get_job(&common::ct(), id).await.unwrap().unwrap();
    assert!(row.locked_at.is_none());
    assert!(row.locked_by.is_none());
}

#[tokio::test]
async fn retry_on_unknown_id_returns_not_found() {
    let pool = setup_db().await;
    let repo = default_repo(pool);

    let err = repo
        .retry(&common::ct(), uuid::Uuid::new_v4(), 1, Utc::now(), serde_json::json!({}), "")
        .await
        .unwrap_err();

    assert!(matches!(err, queuecore::QueueError::NotFound { .. }));
}

#[tokio::test]
async fn retry_preserves_deadline() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let mut job = sample_job();
    job.deadline = Some(Utc::now() + ChronoDuration::hours(1));
    let id = repo.enqueue(&common::ct(), &job).await.unwrap();
    let before = repo.get_job(&common::ct(), id).await.unwrap().unwrap();

    repo.retry(&common::ct(), id, 1, Utc::now() - ChronoDuration::seconds(1), serde_json::json!({}), "")
        .await
        .unwrap();

    let after = repo.get_job(&common::ct(), id).await.unwrap().unwrap();
    assert_eq!(after.deadline, before.deadline);
}
