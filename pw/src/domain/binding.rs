//! Session binding - which conversation the client is attached to

use serde::{Deserialize, Serialize};

use super::id::conversation_id;

/// The conversation a session is bound to
///
/// At most one of {persisted plan id, ephemeral conversation id} is active.
/// An ephemeral conversation is promoted to a plan binding once the service
/// confirms the first document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SessionBinding {
    #[default]
    Unbound,
    Plan(String),
    Conversation(String),
}

impl SessionBinding {
    /// Fresh ephemeral binding for a brand-new plan
    pub fn ephemeral() -> Self {
        Self::Conversation(conversation_id())
    }

    pub fn plan_id(&self) -> Option<&str> {
        match self {
            Self::Plan(id) => Some(id),
            _ => None,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Conversation(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound)
    }

    /// Key the service files this conversation's history under
    pub fn session_key(&self) -> Option<&str> {
        match self {
            Self::Plan(id) | Self::Conversation(id) => Some(id),
            Self::Unbound => None,
        }
    }
}

impl std::fmt::Display for SessionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbound => write!(f, "unbound"),
            Self::Plan(id) => write!(f, "plan:{}", id),
            Self::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::is_ephemeral_conversation;

    #[test]
    fn test_accessors() {
        let plan = SessionBinding::Plan("p1".into());
        assert_eq!(plan.plan_id(), Some("p1"));
        assert_eq!(plan.conversation_id(), None);
        assert_eq!(plan.session_key(), Some("p1"));

        let conv = SessionBinding::ephemeral();
        assert!(conv.plan_id().is_none());
        assert!(is_ephemeral_conversation(conv.conversation_id().unwrap()));

        assert!(!SessionBinding::Unbound.is_bound());
        assert_eq!(SessionBinding::Unbound.session_key(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionBinding::Plan("p1".into()).to_string(), "plan:p1");
        assert_eq!(SessionBinding::Unbound.to_string(), "unbound");
    }
}
