use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single LLM call. Always recoverable: the affected unit of
/// work is skipped.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API key not configured (set {0})")]
    MissingApiKey(String),

    #[error("completion contained no choices")]
    EmptyCompletion,

    #[error("no JSON object found in completion")]
    NoJsonBlock,

    #[error("malformed completion: {0}")]
    Malformed(String),
}

/// Failure of the persisted store. Fatal to the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot I/O failed for {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a pipeline run did not reach its end.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("result store failure: {0}")]
    Store(#[from] StoreError),
}
