use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque byte carrier with a stable textual form. The queue core never
/// interprets the contents; it only needs to store it and hand it back.
#[derive(Debug, Clone, sqlx::Type)]
#[sqlx(transparent)]
pub struct Payload(pub Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A unit of work. Rows in the running table and rows in the result table
/// both map onto this struct; `failed_at` is only ever populated for rows
/// read back from the result table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub priority: i32,
    pub queue: String,
    pub job_type: String,
    pub payload: Payload,
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

impl Job {
    /// Whether this row is currently under an unexpired lease, given the
    /// configured lease window. Mirrors the predicate `Fetch` applies in SQL.
    pub fn is_leased(&self, now: DateTime<Utc>, lease_window: chrono::Duration) -> bool {
        match (self.locked_at, &self.locked_by) {
            (Some(locked_at), Some(locked_by)) if !locked_by.is_empty() => {
                now - locked_at < lease_window
            }
            _ => false,
        }
    }
}

/// Optional narrowing predicate for `Fetch`/`FetchBatch`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub queue: Option<String>,
    pub priority_min: Option<i32>,
    pub priority_max: Option<i32>,
}
