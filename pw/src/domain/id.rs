//! Identifier generation
//!
//! Client-minted ids use the format `{prefix}-{uuid-v7}`, e.g.
//! `new-01939a4e-7c1b-7d2e-9f00-3b4c5d6e7f80`. The time-ordered UUID keeps ids
//! minted in one session sortable by creation order.

use tracing::debug;

/// Prefix for ephemeral conversation ids (sessions with no persisted plan yet)
pub const CONVERSATION_PREFIX: &str = "new";

/// Prefix for locally constructed chat messages
pub const MESSAGE_PREFIX: &str = "local";

/// Prefix for plans created by duplicating another plan
pub const PLAN_PREFIX: &str = "plan";

/// Generate a prefixed, time-ordered id
pub fn generate_id(prefix: &str) -> String {
    let id = format!("{}-{}", prefix, uuid::Uuid::now_v7());
    debug!(%id, "generate_id: minted");
    id
}

/// Mint an ephemeral conversation id for an unbound session
pub fn conversation_id() -> String {
    generate_id(CONVERSATION_PREFIX)
}

/// Mint an id for an optimistic local message
pub fn message_id() -> String {
    generate_id(MESSAGE_PREFIX)
}

/// Positional id for an authoritative message that arrived without one
pub fn positional_message_id(index: usize) -> String {
    format!("msg-{}", index)
}

/// True if the id was minted client-side as an ephemeral conversation id
pub fn is_ephemeral_conversation(id: &str) -> bool {
    id.starts_with(&format!("{}-", CONVERSATION_PREFIX))
}
