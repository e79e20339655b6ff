mod common;

use common::{default_repo, no_filter, sample_job, setup_db, within_one_second};
use chrono::Utc;

#[tokio::test]
async fn enqueue_clears_caller_supplied_lease_and_failure_fields() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();

    let row = repo.get_job(&common::ct(), id).await.unwrap().expect("row should exist");

    assert_eq!(row.retried, 0, "retried must be forced to zero on insert");
    assert!(row.last_error.is_none(), "last_error must never survive enqueue");
    assert!(row.failed_at.is_none(), "failed_at must never survive enqueue");
    assert!(row.locked_at.is_none(), "locked_at must never survive enqueue");
    assert!(row.locked_by.is_none(), "locked_by must never survive enqueue");

    // Everything else from the caller's job should have come through intact.
    assert_eq!(row.priority, 12);
    assert_eq!(row.queue, "test");
    assert_eq!(row.job_type, "testtype");
    assert_eq!(row.uuid, "uuidtest");
    assert_eq!(row.timeout, 10);
    assert_eq!(row.max_retry, 14);
}

#[tokio::test]
async fn enqueue_stamps_created_and_updated_at_to_now() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let before = Utc::now();
    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    let row = repo.get_job(&common::ct(), id).await.unwrap().unwrap();

    assert!(within_one_second(row.created_at, before));
    assert!(within_one_second(row.updated_at, before));
    assert_eq!(row.created_at, row.updated_at);
}

#[tokio::test]
async fn enqueue_is_immediately_visible_to_fetch() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());

    let mut job = sample_job();
    job.run_at = Utc::now() - chrono::Duration::seconds(1);
    let id = repo.enqueue(&common::ct(), &job).await.unwrap();

    let leased = repo
        .fetch(&common::ct(), "tw", &no_filter())
        .await
        .unwrap()
        .expect("job should be fetchable right after enqueue");

    assert_eq!(leased.id, id);
}

// S1 — enqueue/fetch round-trip.
#[tokio::test]
async fn s1_enqueue_fetch_round_trip() {
    let pool = setup_db().await;
    let repo = default_repo(pool.clone());
    let now = Utc::now();

    let id = repo.enqueue(&common::ct(), &sample_job()).await.unwrap();
    let job = repo.fetch(&common::ct(), "tw", &no_filter()).await.unwrap().expect("should fetch");

    assert_eq!(job.id, id);
    assert_eq!(job.locked_by.as_deref(), Some("tw"));
    assert_eq!(job.last_error, None);
    assert_eq!(job.failed_at, None);
    assert_eq!(job.retried, 0);
    assert_eq!(job.priority, 12);
    assert_eq!(job.queue, "test");
    assert_eq!(job.job_type, "testtype");
    assert_eq!(job.uuid, "uuidtest");
    assert_eq!(job.timeout, 10);
    assert_eq!(job.max_retry, 14);
    assert!(within_one_second(job.created_at, now));
    assert!(within_one_second(job.updated_at, now));
    assert!(within_one_second(job.locked_at.expect("locked_at set"), now));
}
