use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No record for {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Dependency '{name}' unavailable: {detail}")]
    DependencyDegraded { name: &'static str, detail: String },

    #[error("Cluster detection already running (lease held by {holder})")]
    ConcurrentBatchConflict { holder: String },

    #[error("Write conflict on node '{user_id}' after {attempts} attempts")]
    WriteConflict { user_id: String, attempts: u32 },

    #[error("Data integrity: {detail}")]
    DataIntegrity { detail: String },

    #[error("Batch run aborted by operator")]
    BatchAborted,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GraphError {
    /// True for failures the caller may retry later without changing the
    /// request: the batch lease conflict and exhausted write retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentBatchConflict { .. } | Self::WriteConflict { .. }
        )
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
