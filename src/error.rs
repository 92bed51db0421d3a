//! Error types for the draft companion.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("League client is not running")]
    ClientNotRunning,

    #[error("failed to parse client credentials: {0}")]
    ParseError(String),

    #[error("credential source not readable: {0}")]
    PermissionDenied(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("client rejected our credentials")]
    Auth,

    #[error("resource not available in the current phase")]
    NotInPhase,

    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("browser dispatch failed: {0}")]
    Dispatch(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AppError::Http(status.as_u16()),
            None => AppError::Transport(e.to_string()),
        }
    }
}

impl AppError {
    /// True for failures the supervisor recovers from by waiting and
    /// reconnecting (possibly with fresh credentials).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ClientNotRunning | AppError::Transport(_) | AppError::Auth
        )
    }
}
