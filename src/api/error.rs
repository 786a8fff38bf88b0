use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}")]
    Status {
        method: &'static str,
        path: String,
        status: StatusCode,
    },

    #[error("not authorized, log in or configure a token")]
    Unauthorized,

    #[error("journal entry {0} not found")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}
