//! Seeded welcome messages

use chrono::{DateTime, Utc};

use crate::domain::ChatMessage;

pub const NEW_PLAN_WELCOME_ID: &str = "welcome-new";
pub const EXISTING_PLAN_WELCOME_ID: &str = "welcome-existing";

const NEW_PLAN_WELCOME: &str =
    "Hello! I'm your Account Plan Agent. What company and goal would you like to work on?";

const EXISTING_PLAN_WELCOME: &str = "Welcome back to this account plan. Ask me to research something new, \
     refine a section, or review an earlier version.";

/// Deterministic welcome; the variant depends only on whether a plan id is bound
pub fn welcome_message(plan_bound: bool, now: DateTime<Utc>) -> ChatMessage {
    if plan_bound {
        ChatMessage::assistant_with_id(EXISTING_PLAN_WELCOME_ID, EXISTING_PLAN_WELCOME, now)
    } else {
        ChatMessage::assistant_with_id(NEW_PLAN_WELCOME_ID, NEW_PLAN_WELCOME, now)
    }
}
