//! Session error types

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::backend::BackendError;
use crate::store::StoreError;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No user is signed in")]
    NoUser,

    #[error("A request is already in flight for this session")]
    Busy,

    #[error("Session has been rebound; result discarded")]
    Stale,

    #[error("Session runtime is not running")]
    ChannelClosed,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Document error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Response from session operations
pub type SessionResponse<T> = Result<T, SessionError>;
