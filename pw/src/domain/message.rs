//! Transcript and research-progress types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::id::message_id;

/// Who authored a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Research status as reported by the service
///
/// Transitions are driven only by the service: `idle → researching → {done, idle}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    #[default]
    Idle,
    Researching,
    Done,
}

impl ResearchStatus {
    /// Anything other than `Researching` ends a run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Researching)
    }
}

impl std::fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Researching => write!(f, "researching"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// One step of a multi-step research run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTask {
    pub task: String,

    /// Task ids come back as numbers or strings depending on the producer
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ResearchTask {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            id: None,
            status: None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Snapshot of a research run's progress
///
/// `duration` (seconds) is attached by the client once a run concludes; the
/// service never sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProgress {
    #[serde(alias = "current_step")]
    pub current_step: u32,

    #[serde(alias = "total_steps")]
    pub total_steps: u32,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub tasks: Vec<ResearchTask>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl ResearchProgress {
    /// Fraction complete in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.current_step.min(self.total_steps) as f64) / (self.total_steps as f64)
    }
}

/// A single transcript message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_progress: Option<ResearchProgress>,
}

impl ChatMessage {
    /// Locally constructed user message with a fresh id
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let msg = Self {
            id: message_id(),
            role: Role::User,
            content: content.into(),
            timestamp,
            research_progress: None,
        };
        debug!(id = %msg.id, "ChatMessage::user: created");
        msg
    }

    /// Locally constructed assistant message with a fresh id
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: message_id(),
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            research_progress: None,
        }
    }

    /// Assistant message with a caller-chosen id (seeded welcome messages)
    pub fn assistant_with_id(id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            research_progress: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_accepts_service_aliases() {
        let human: Role = serde_json::from_str("\"human\"").unwrap();
        let ai: Role = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(human, Role::User);
        assert_eq!(ai, Role::Assistant);
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_status_terminal() {
        assert!(ResearchStatus::Idle.is_terminal());
        assert!(ResearchStatus::Done.is_terminal());
        assert!(!ResearchStatus::Researching.is_terminal());
    }

    #[test]
    fn test_progress_accepts_snake_case() {
        let json = r#"{
            "current_step": 2,
            "total_steps": 4,
            "label": "Step 2/4: revenue",
            "visual": "progress_bar",
            "tasks": [{"id": 1, "task": "revenue", "status": "pending"}, {"task": "competitors"}]
        }"#;
        let progress: ResearchProgress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.total_steps, 4);
        assert_eq!(progress.tasks[0].id.as_deref(), Some("1"));
        assert_eq!(progress.tasks[1].id, None);
        assert_eq!(progress.duration, None);
        assert!((progress.fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_fraction_zero_total() {
        let progress = ResearchProgress {
            current_step: 0,
            total_steps: 0,
            label: String::new(),
            tasks: vec![],
            duration: None,
        };
        assert_eq!(progress.fraction(), 0.0);
    }
}
