//! Research service boundary
//!
//! The trait every transport implements, its wire types and errors, and the
//! reqwest-backed client.

mod client;
mod error;
mod http;
mod types;

pub use client::ResearchBackend;
pub use error::BackendError;
pub use http::HttpBackend;
pub use types::{ChatRequest, ChatResponse, HistoryResponse, UpdatePlanResponse, WireMessage};

#[cfg(test)]
pub use client::mock;
