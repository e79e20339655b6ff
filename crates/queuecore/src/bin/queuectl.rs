use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "queuectl <command>\n\
             Commands:\n\
             - reset\n\
             - seed <n>\n\
             - demo\n\
             \n\
             Uses DATABASE_URL or TEST_DATABASE_URL.\n"
        );
        std::process::exit(2);
    }

    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .expect("DATABASE_URL or TEST_DATABASE_URL must be set");

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;

    match args[1].as_str() {
        "reset" => reset(&pool).await?,
        "seed" => {
            let n: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            seed(&pool, n).await?;
        }
        "demo" => {
            reset(&pool).await?;
            seed(&pool, 5).await?;
            show_counts(&pool).await?;
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn reset(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        TRUNCATE TABLE ql_policy_decisions, ql_attempts, ql_results, ql_jobs
        "#,
    )
    .execute(pool)
    .await?;

    println!("reset OK");
    Ok(())
}

async fn seed(pool: &PgPool, n: i64) -> anyhow::Result<()> {
    for i in 0..n {
        let job_type = if i % 2 == 0 { "demo_ok" } else { "fail_me" };

        let job_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO ql_jobs (priority, queue, job_type, payload, uuid, run_at, timeout, max_retry)
            VALUES (0, 'default', $1, '{}'::jsonb, '', now(), 30, 5)
            RETURNING id
            "#,
        )
        .bind(job_type)
        .fetch_one(pool)
        .await?;

        println!("+ inserted job {job_type} id={job_id}");
    }
    Ok(())
}

async fn show_counts(pool: &PgPool) -> anyhow::Result<()> {
    let running: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ql_jobs")
        .fetch_one(pool)
        .await?;
    let leased: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ql_jobs WHERE locked_by IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ql_results")
        .fetch_one(pool)
        .await?;

    println!("jobs: running={running} leased={leased} results={results}");
    Ok(())
}
