//! Artifact store error types

use thiserror::Error;

use crate::backend::BackendError;
use crate::domain::ContentError;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("No plan document is loaded")]
    NoDocument,

    #[error("Not editing")]
    NotEditing,

    #[error("An edit is already in progress")]
    AlreadyEditing,

    #[error("Unknown version: {0}")]
    UnknownVersion(u32),

    #[error("Section index out of range: {0}")]
    SectionOutOfRange(usize),

    #[error("Section already exists: {0}")]
    DuplicateSection(String),

    #[error("Section title must not be empty")]
    EmptyTitle,

    #[error("Invalid content edit: {0}")]
    InvalidPath(String),

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] BackendError),
}

impl From<ContentError> for ArtifactError {
    fn from(e: ContentError) -> Self {
        ArtifactError::InvalidPath(e.to_string())
    }
}
