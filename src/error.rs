use std::path::PathBuf;
use thiserror::Error;

/// Symbol catalog failures. Any of these aborts the run before processing.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file does not exist: {0}")]
    Missing(PathBuf),

    #[error("catalog {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Record store failures for a single key.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("invalid record key {0:?}")]
    InvalidKey(String),
}

/// Collector failures. These never leave the collector: they are folded
/// into a miss or a failure outcome.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bad URL: {0}")]
    Url(#[from] url::ParseError),
}

impl CollectorError {
    /// Worth retrying: rate limiting, server errors, transport trouble.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Url(_) => false,
            Self::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Request(e) => !e.is_decode() && !e.is_builder(),
        }
    }
}
