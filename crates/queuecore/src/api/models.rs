use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::Job;

/// Flattened view of a `Job` row for the admin API's JSON responses.
/// Payload is rendered via its stable `Display` rather than re-serialized,
/// matching the opaque-byte-carrier contract.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: Uuid,
    pub priority: i32,
    pub queue: String,
    pub job_type: String,
    pub payload: String,
    pub uuid: String,
    pub run_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub timeout: i32,
    pub max_retry: i32,
    pub retried: i32,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobView {
    fn from(j: Job) -> Self {
        Self {
            id: j.id,
            priority: j.priority,
            queue: j.queue,
            job_type: j.job_type,
            payload: j.payload.to_string(),
            uuid: j.uuid,
            run_at: j.run_at,
            deadline: j.deadline,
            timeout: j.timeout,
            max_retry: j.max_retry,
            retried: j.retried,
            locked_at: j.locked_at,
            locked_by: j.locked_by,
            last_error: j.last_error,
            failed_at: j.failed_at,
            created_at: j.created_at,
            updated_at: j.updated_at,
        }
    }
}
