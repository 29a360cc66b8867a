use thiserror::Error;

use crate::models::MatchingRun;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Explanation error: {0}")]
    Explanation(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A matching run is already in progress")]
    AlreadyRunning {
        /// The run currently holding the cycle, when it could be looked up.
        running: Option<Box<MatchingRun>>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatchError {
    /// True for the expected conflict raised when two triggers race for the
    /// run lock. Callers map this to a non-fatal "skipped" outcome.
    pub fn is_already_running(&self) -> bool {
        matches!(self, MatchError::AlreadyRunning { .. })
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
