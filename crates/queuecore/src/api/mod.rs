use axum::response::Html;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::models::JobView;
use crate::jobs::JobsRepo;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub jobs: JobsRepo,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(admin_index))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/results", get(list_results))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

const ADMIN_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>queuecore admin</title>
</head>
<body>
  <h1>queuecore admin</h1>
  <p>Endpoints: GET /jobs, GET /jobs/:id, GET /results, GET /metrics, GET /health</p>
</body>
</html>
"#;

pub async fn admin_index() -> Html<&'static str> {
    Html(ADMIN_HTML)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn internal_err(e: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub queue: Option<String>,
    pub priority_min: Option<i32>,
    pub priority_max: Option<i32>,
    pub limit: Option<i64>,
    pub cursor_created_at: Option<DateTime<Utc>>,
    pub cursor_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub items: Vec<JobView>,
    pub next_cursor_created_at: Option<DateTime<Utc>>,
    pub next_cursor_id: Option<Uuid>,
}

fn paginated_response(rows: Vec<crate::jobs::Job>) -> ListJobsResponse {
    let (next_cursor_created_at, next_cursor_id) = rows
        .last()
        .map(|j| (Some(j.created_at), Some(j.id)))
        .unwrap_or((None, None));

    ListJobsResponse {
        items: rows.into_iter().map(JobView::from).collect(),
        next_cursor_created_at,
        next_cursor_id,
    }
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListJobsResponse>, (StatusCode, Json<ErrorBody>)> {
    let rows = state
        .jobs
        .list_jobs(
            &CancellationToken::new(),
            q.queue.as_deref(),
            q.priority_min,
            q.priority_max,
            q.limit.unwrap_or(100),
            q.cursor_created_at,
            q.cursor_id,
        )
        .await
        .map_err(|e| internal_err(e.into()))?;

    Ok(Json(paginated_response(rows)))
}

pub async fn list_results(
    State(state): State<ApiState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListJobsResponse>, (StatusCode, Json<ErrorBody>)> {
    let rows = state
        .jobs
        .list_results(
            &CancellationToken::new(),
            q.queue.as_deref(),
            q.priority_min,
            q.priority_max,
            q.limit.unwrap_or(100),
            q.cursor_created_at,
            q.cursor_id,
        )
        .await
        .map_err(|e| internal_err(e.into()))?;

    Ok(Json(paginated_response(rows)))
}

pub async fn get_job(
    Path(id): Path<Uuid>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    match state.jobs.get_job(&CancellationToken::new(), id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(JobView::from(job))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "job not found".into(),
            }),
        )
            .into_response(),
        Err(e) => internal_err(e.into()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub now_utc: DateTime<Utc>,
    pub running: i64,
    pub leased: i64,
    pub results: i64,
}

pub async fn metrics(
    State(state): State<ApiState>,
) -> Result<Json<MetricsResponse>, (StatusCode, Json<ErrorBody>)> {
    let (running, leased, results) = state
        .jobs
        .metrics_snapshot(&CancellationToken::new())
        .await
        .map_err(|e| internal_err(e.into()))?;

    Ok(Json(MetricsResponse {
        now_utc: Utc::now(),
        running,
        leased,
        results,
    }))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
