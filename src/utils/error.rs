use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Source {source_id} failed: {message}")]
    SourceFetch { source_id: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("Detail fetch failed: {0}")]
    UpstreamDetail(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("All {failed} sources failed to refresh")]
    TotalRefreshFailure { failed: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Errors the caller can fix by changing the request. Never cached, never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
