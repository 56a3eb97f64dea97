//! Transcript reconciliation
//!
//! The service's transcript is authoritative, but it never round-trips the
//! client's annotations (research progress, run duration, display
//! timestamps). Reconciliation replaces the local transcript wholesale and
//! re-attaches those annotations by message id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backend::WireMessage;
use crate::domain::{ChatMessage, ResearchProgress, Role, id};

/// Drop continuation sentinels and blank assistant turns
pub fn visible_messages(messages: Vec<WireMessage>, sentinel: &str) -> Vec<WireMessage> {
    let sentinel = sentinel.trim();
    messages
        .into_iter()
        .filter(|m| match m.role {
            Role::User => m.content.trim() != sentinel,
            Role::Assistant => !m.content.trim().is_empty(),
        })
        .collect()
}

/// Merge an authoritative transcript with the local one
pub fn reconcile(
    local: &[ChatMessage],
    authoritative: Vec<WireMessage>,
    sentinel: &str,
    now: DateTime<Utc>,
) -> Vec<ChatMessage> {
    let by_id: HashMap<&str, &ChatMessage> = local.iter().map(|m| (m.id.as_str(), m)).collect();
    let merged: Vec<ChatMessage> = visible_messages(authoritative, sentinel)
        .into_iter()
        .enumerate()
        .map(|(i, wire)| {
            let id = wire.id.unwrap_or_else(|| id::positional_message_id(i));
            let previous = by_id.get(id.as_str()).copied();
            ChatMessage {
                research_progress: merge_progress(wire.research_progress, previous.and_then(|m| m.research_progress.as_ref())),
                timestamp: previous.map(|m| m.timestamp).unwrap_or(now),
                id,
                role: wire.role,
                content: wire.content,
            }
        })
        .collect();
    debug!(local = local.len(), merged = merged.len(), "reconcile: done");
    merged
}

fn merge_progress(
    authoritative: Option<ResearchProgress>,
    local: Option<&ResearchProgress>,
) -> Option<ResearchProgress> {
    match (authoritative, local) {
        (Some(mut auth), Some(local)) => {
            if auth.duration.is_none() {
                auth.duration = local.duration;
            }
            Some(auth)
        }
        (Some(auth), None) => Some(auth),
        (None, local) => local.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn progress(step: u32, duration: Option<u64>) -> ResearchProgress {
        ResearchProgress {
            current_step: step,
            total_steps: 3,
            label: format!("Step {}/3", step),
            tasks: vec![],
            duration,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn wire(id: Option<&str>, role: Role, content: &str) -> WireMessage {
        WireMessage {
            id: id.map(str::to_string),
            ..WireMessage::new(role, content)
        }
    }

    #[test]
    fn test_preserves_local_progress_when_missing() {
        let mut local = ChatMessage::assistant_with_id("m1", "Done researching", at(10));
        local.research_progress = Some(progress(3, Some(42)));

        let merged = reconcile(
            &[local.clone()],
            vec![wire(Some("m1"), Role::Assistant, "Done researching")],
            "continue",
            at(99),
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "m1");
        assert_eq!(merged[0].research_progress, Some(progress(3, Some(42))));
        assert_eq!(merged[0].timestamp, at(10));
    }

    #[test]
    fn test_authoritative_progress_wins_but_keeps_duration() {
        let mut local = ChatMessage::assistant_with_id("m1", "x", at(10));
        local.research_progress = Some(progress(2, Some(7)));
        let mut auth = wire(Some("m1"), Role::Assistant, "x");
        auth.research_progress = Some(progress(3, None));

        let merged = reconcile(&[local], vec![auth], "continue", at(99));
        assert_eq!(merged[0].research_progress, Some(progress(3, Some(7))));
    }

    #[test]
    fn test_drops_sentinels_and_blank_steps() {
        let merged = reconcile(
            &[],
            vec![
                wire(None, Role::User, "research Nike"),
                wire(None, Role::Assistant, ""),
                wire(None, Role::User, "continue"),
                wire(None, Role::Assistant, "Step 2 findings"),
                wire(None, Role::User, " continue "),
                wire(None, Role::Assistant, "All done"),
            ],
            "continue",
            at(5),
        );
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["research Nike", "Step 2 findings", "All done"]);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg-0", "msg-1", "msg-2"]);
        assert!(merged.iter().all(|m| m.timestamp == at(5)));
    }

    #[test]
    fn test_positional_ids_are_stable_as_transcript_grows() {
        let first = reconcile(
            &[],
            vec![wire(None, Role::User, "hi"), wire(None, Role::Assistant, "hello")],
            "continue",
            at(1),
        );
        let mut local = first.clone();
        local[1].research_progress = Some(progress(1, Some(3)));

        let second = reconcile(
            &local,
            vec![
                wire(None, Role::User, "hi"),
                wire(None, Role::Assistant, "hello"),
                wire(None, Role::User, "more"),
                wire(None, Role::Assistant, "sure"),
            ],
            "continue",
            at(2),
        );
        assert_eq!(second[1].research_progress, Some(progress(1, Some(3))));
        assert_eq!(second[1].timestamp, at(1));
        assert_eq!(second[3].timestamp, at(2));
    }
}
