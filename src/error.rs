//! Error types for the tool-call gateway

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("service login failed: {0}")]
    UpstreamAuth(String),

    #[error("rate limit exceeded for '{category}', retry in {retry_after_secs}s")]
    RateLimited {
        category: String,
        retry_after_secs: u64,
    },

    #[error("invalid or expired confirmation token: {0}")]
    InvalidConfirmation(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("backend error: {0}")]
    Upstream(String),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
