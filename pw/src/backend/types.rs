//! Wire types for the research service API
//!
//! Field names follow the service's camelCase JSON. Responses are lenient:
//! everything but the research status may be absent.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountPlan, AttachedFile, ResearchProgress, ResearchStatus, ResearchTask, Role};

/// `POST /api/chat` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: String,
    pub plan_id: Option<String>,
    pub message: String,
    /// Only meaningful when `plan_id` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// A transcript message as the service reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_progress: Option<ResearchProgress>,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            research_progress: None,
        }
    }
}

/// `POST /api/chat` response body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub plan: Option<AccountPlan>,
    #[serde(default)]
    pub new_version_created: bool,
    #[serde(default)]
    pub research_status: ResearchStatus,
    #[serde(default)]
    pub progress: Option<ResearchProgress>,
    /// A proposed (not yet accepted) task list
    #[serde(default)]
    pub research_plan: Option<Vec<ResearchTask>>,
    #[serde(default)]
    pub attached_files: Option<Vec<AttachedFile>>,
}

/// `GET /api/history/{id}` response body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub attached_files: Vec<AttachedFile>,
}

/// `PUT /api/plans/{id}` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlanResponse {
    #[serde(default)]
    pub status: String,
    pub plan: AccountPlan,
}
