use queuecore::api;
use queuecore::db;
use queuecore::jobs::{
    cutoff_days, AttemptsRepo, Filter, JobsRepo, MaintenanceRepo, PolicyDecisionsRepo, RetryConfig,
    RetryPolicy,
};
use queuecore::QueueConfig;

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod handlers;
use handlers::{build_registry, JobContext, JobError};

enum JobExecutionOutcome {
    Succeeded {
        job_id: Uuid,
        attempt_id: Uuid,
    },
    Failed {
        job_id: Uuid,
        attempt_id: Uuid,
        attempt_no: i32,
        max_retry: i32,
        payload: serde_json::Value,
        error_code: String,
        error_message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = QueueConfig::from_env()?;

    let dequeue_batch_size: i64 = std::env::var("QUEUE_DEQUEUE_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let reap_interval = Duration::from_millis(
        std::env::var("QUEUE_REAP_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5_000),
    );
    let prune_results_after_days: i64 = std::env::var("QUEUE_PRUNE_RESULTS_AFTER_DAYS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);
    let maintenance_interval_secs: u64 = std::env::var("QUEUE_MAINTENANCE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    tracing::info!(
        worker_id = %cfg.worker_id,
        queue = %cfg.queue,
        lease_window_secs = cfg.lease_window_secs,
        dequeue_batch_size,
        admin_addr = ?cfg.admin_addr,
        migrate_on_startup = cfg.migrate_on_startup,
        "worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let jobs_repo = JobsRepo::new(
        pool.clone(),
        cfg.running_table(),
        cfg.result_table(),
        cfg.lease_window_secs,
    );
    let attempts_repo = AttemptsRepo::new(pool.clone());
    let maintenance_repo = MaintenanceRepo::new(pool.clone(), cfg.running_table(), cfg.result_table());
    let policy_decisions_repo = PolicyDecisionsRepo::new(pool.clone());
    let retry_policy = RetryPolicy::new(RetryConfig::default(), policy_decisions_repo);

    let registry = build_registry();
    let ctx = JobContext {
        db: pool.clone(),
        worker_id: cfg.worker_id.clone(),
    };

    // Cancelled on SIGINT/ctrl-c; threaded into every `JobsRepo` call so an
    // in-flight store round-trip surfaces `QueueError::Cancelled` instead of
    // the worker loop blocking shutdown on whatever query happens to be
    // running.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    // ---- API task ----
    let api_state = api::ApiState {
        jobs: jobs_repo.clone(),
    };
    let app = api::router(api_state);
    let admin_addr = cfg.admin_addr.clone();

    let api_handle = tokio::spawn(async move {
        if let Some(addr) = admin_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "admin api listening");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Maintenance task ----
    let maintenance_handle = {
        let maintenance = maintenance_repo.clone();
        let lease_window_secs = cfg.lease_window_secs;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            while !shutdown.is_cancelled() {
                match maintenance.count_stale_leases(lease_window_secs).await {
                    Ok(n) if n > 0 => tracing::warn!(count = n, "stale leases detected"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "maintenance: stale lease scan failed"),
                }

                let cutoff = cutoff_days(prune_results_after_days);
                match maintenance.prune_old_results(cutoff, 500).await {
                    Ok(n) if n > 0 => tracing::info!(count = n, "pruned old results"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "maintenance: prune failed"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(maintenance_interval_secs)) => {}
                    _ = shutdown.cancelled() => break,
                }
            }

            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Worker loop task ----
    let worker_id = cfg.worker_id.clone();
    let worker_queue = cfg.queue.clone();

    let worker_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
        let mut last_reap_at = Instant::now() - reap_interval;

        while !shutdown.is_cancelled() {
            if last_reap_at.elapsed() >= reap_interval {
                match maintenance_repo.count_stale_leases(cfg.lease_window_secs).await {
                    Ok(n) if n > 0 => tracing::debug!(count = n, "stale leases observed, will reclaim on next fetch"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "reap scan failed"),
                }
                last_reap_at = Instant::now();
            }

            let filter = Filter {
                queue: Some(worker_queue.clone()),
                priority_min: None,
                priority_max: None,
            };
            let batch = match jobs_repo
                .fetch_batch(&shutdown, &worker_id, &filter, dequeue_batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(queuecore::QueueError::Cancelled) => break,
                Err(e) => return Err(e.into()),
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            }

            let mut join_set = tokio::task::JoinSet::new();
            for job in batch {
                let registry = registry.clone();
                let ctx = ctx.clone();
                let attempts_repo = attempts_repo.clone();
                let worker_id_for_task = worker_id.clone();
                let attempt_no = job.retried + 1;
                let max_retry = job.max_retry;
                let payload = job.payload.as_value().clone();

                join_set.spawn(async move {
                    let attempt = attempts_repo.start_attempt(job.id, &worker_id_for_task).await?;

                    let result: Result<(), JobError> = match registry.handler_for(&job.job_type) {
                        Some(entry) => entry.run(&job, &ctx).await,
                        None => Err(JobError::new(
                            "UNKNOWN_JOB_TYPE",
                            format!("no handler for job_type={}", job.job_type),
                        )),
                    };

                    let outcome = match result {
                        Ok(()) => {
                            attempts_repo.finish_succeeded(attempt.id).await?;
                            JobExecutionOutcome::Succeeded {
                                job_id: job.id,
                                attempt_id: attempt.id,
                            }
                        }
                        Err(err) => {
                            attempts_repo
                                .finish_failed(attempt.id, err.code, &err.message)
                                .await?;
                            JobExecutionOutcome::Failed {
                                job_id: job.id,
                                attempt_id: attempt.id,
                                attempt_no,
                                max_retry,
                                payload,
                                error_code: err.code.to_string(),
                                error_message: err.message,
                            }
                        }
                    };

                    Ok::<JobExecutionOutcome, anyhow::Error>(outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined?? {
                    JobExecutionOutcome::Succeeded { job_id, attempt_id } => {
                        jobs_repo.succeed(&shutdown, job_id).await?;
                        tracing::debug!(%job_id, %attempt_id, "job completed");
                    }
                    JobExecutionOutcome::Failed {
                        job_id,
                        attempt_id: _,
                        attempt_no,
                        max_retry,
                        payload,
                        error_code,
                        error_message,
                    } => {
                        let decision = retry_policy
                            .on_failure(
                                &shutdown,
                                &jobs_repo,
                                job_id,
                                payload,
                                &error_code,
                                &error_message,
                                attempt_no,
                                max_retry,
                            )
                            .await?;
                        tracing::warn!(%job_id, ?decision, code = %error_code, "job failed");
                    }
                }
            }
        }

        tracing::info!("worker loop stopping");
        Ok::<(), anyhow::Error>(())
    }});

    tokio::select! {
        res = api_handle => res??,
        res = worker_handle => res??,
        res = maintenance_handle => res??,
    }

    jobs_repo.close(&CancellationToken::new()).await;

    Ok(())
}
