//! LLM infrastructure error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors from provider adapters.
///
/// Retryable variants are retried by the adapter layer with exponential
/// backoff before being surfaced to the caller.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether the adapter may retry this call.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::Json(_) => false,
            LlmError::Cancelled => false,
        }
    }

    /// Server-suggested retry delay, when rate limited.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
