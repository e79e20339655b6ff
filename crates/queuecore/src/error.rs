use uuid::Uuid;

/// Error type returned from the `JobsRepo` boundary. Everything below this
/// boundary (admin API, CLI, worker binary) stays on `anyhow` as the teacher
/// does; this enum exists so library callers can `match` on the kind of
/// failure instead of grepping a formatted string.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("operation cancelled")]
    Cancelled,
}
