//! Artifact version store
//!
//! Owns the canonical plan document, the view pointer into its history and the
//! edit buffer. Only the live document is ever edited.

mod error;
mod store;

pub use error::ArtifactError;
pub use store::{ArtifactStore, ViewPointer};
