mod common;

use common::{default_repo, no_filter, sample_job, setup_db};
use queuecore::jobs::AttemptsRepo;

#[tokio::test]
async fn start_attempt_increments_attempt_no_per_job() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    repo.fetch(&common::ct(), "worker-a", &no_filter()).await.unwrap();

    let a1 = attempts.start_attempt(id, "worker-a").await.unwrap();
    let a2 = attempts.start_attempt(id, "worker-a").await.unwrap();

    assert_eq!(a1.attempt_no, 1);
    assert_eq!(a2.attempt_no, 2);
    assert_eq!(a1.status, "running");

    let history = attempts.list_attempts_for_job(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].attempt_no, 1);
    assert_eq!(history[1].attempt_no, 2);
}

#[tokio::test]
async fn finish_succeeded_updates_status_and_finished_at() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    let attempt = attempts.start_attempt(id, "worker-a").await.unwrap();
    attempts.finish_succeeded(attempt.id).await.unwrap();

    let history = attempts.list_attempts_for_job(id).await.unwrap();
    assert_eq!(history[0].status, "succeeded");
    assert!(history[0].finished_at.is_some());
}

#[tokio::test]
async fn finish_failed_records_error_code_and_message() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    let attempt = attempts.start_attempt(id, "worker-a").await.unwrap();
    attempts
        .finish_failed(attempt.id, "TIMEOUT", "request timed out")
        .await
        .unwrap();

    let history = attempts.list_attempts_for_job(id).await.unwrap();
    assert_eq!(history[0].status, "failed");
    assert_eq!(history[0].error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(history[0].error_message.as_deref(), Some("request timed out"));
}
