//! Planwright - session controller for conversational account-plan research
//!
//! A client talks to a research service that turns chat turns into a
//! versioned account plan. Planwright keeps the client side consistent:
//! which conversation is active, what the transcript shows, when to keep a
//! multi-step research run going, which version of the plan is displayed and
//! how local edits are committed.
//!
//! # Core Concepts
//!
//! - **One binding at a time**: a session is attached to a persisted plan or
//!   an ephemeral conversation, and every rebind discards in-flight work
//! - **Service owns the truth**: authoritative transcripts and documents
//!   replace local state, with local-only details carried over
//! - **Hidden continuations**: research runs advance with sentinel requests
//!   that never appear in the transcript
//!
//! # Modules
//!
//! - [`session`] - Session controller and its actor runtime
//! - [`artifact`] - Plan document, view pointer and edit buffer
//! - [`versions`] - Pure functions over a plan's version history
//! - [`mention`] - Attachment set and `@file` resolution
//! - [`backend`] - Research service client
//! - [`store`] - Local plan and session cache
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod artifact;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod domain;
pub mod mention;
pub mod repl;
pub mod session;
pub mod store;
pub mod versions;

// Re-export commonly used types
pub use artifact::{ArtifactError, ArtifactStore, ViewPointer};
pub use auth::{AuthError, AuthProvider, ConfigAuthProvider, UserContext};
pub use backend::{BackendError, ChatRequest, ChatResponse, HistoryResponse, HttpBackend, ResearchBackend, WireMessage};
pub use config::Config;
pub use domain::{
    AccountPlan, AttachedFile, ChatMessage, ContentEdit, ContentPath, PlanSection, PlanSnapshot, ResearchProgress,
    ResearchStatus, ResearchTask, Role, SectionContent, SessionBinding,
};
pub use mention::{AttachmentResolver, MentionSelection, MentionToken};
pub use session::{
    Repositories, SessionController, SessionError, SessionEvent, SessionHandle, SessionResponse, SessionRuntime,
    SessionSnapshot,
};
pub use store::{JsonFileStore, MemoryStore, PlanRepository, SessionRecord, SessionRepository, StoreError};
pub use versions::{VersionEntry, list_versions};
