//! Local store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn plan_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "plan",
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "session",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
