//! Remote service error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the research service
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Check if this error is retryable (only ever applied to idempotent reads)
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            BackendError::Network(_) => true,
            BackendError::Timeout(_) => true,
            BackendError::InvalidResponse(_) => false,
            BackendError::Json(_) => false,
        }
    }

    /// True for a 404 from the service
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Api { status: 404, .. })
    }
}
