//! Domain types for planwright
//!
//! Core types: AccountPlan (the versioned document), ChatMessage (the
//! transcript), ResearchProgress (multi-step research state) and the
//! SessionBinding that ties them to one conversation.

mod binding;
mod content;
mod file;
pub mod id;
mod message;
mod plan;

pub use binding::SessionBinding;
pub use content::{ContentEdit, ContentError, ContentPath, ListEntry, Mapping, PathSegment, SectionContent};
pub use file::AttachedFile;
pub use message::{ChatMessage, ResearchProgress, ResearchStatus, ResearchTask, Role};
pub use plan::{AccountPlan, PlanConflict, PlanSection, PlanSnapshot};
