//! AccountPlan - the versioned research document

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::content::SectionContent;

/// A titled section of a plan; titles are unique within a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    pub title: String,
    #[serde(default)]
    pub content: SectionContent,
}

impl PlanSection {
    pub fn new(title: impl Into<String>, content: SectionContent) -> Self {
        Self {
            title: title.into(),
            content,
        }
    }
}

/// A contradiction between research sources that the service tracks on the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConflict {
    pub description: String,

    #[serde(default = "default_conflict_status")]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

fn first_version() -> u32 {
    1
}

fn default_conflict_status() -> String {
    "unresolved".to_string()
}

impl PlanConflict {
    pub fn is_resolved(&self) -> bool {
        self.status == "resolved"
    }
}

/// The live, canonical plan document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPlan {
    pub id: String,

    /// Absent in exported documents; the store assigns the owner on import
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub title: Option<String>,

    /// Timestamps are opaque ISO-8601 strings owned by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Monotonically non-decreasing over the document's lifetime
    #[serde(default = "first_version")]
    pub version: u32,

    #[serde(default)]
    pub sections: Vec<PlanSection>,

    #[serde(default)]
    pub conflicts: Vec<PlanConflict>,

    /// Prior states, each tagged with the version it represents
    #[serde(default)]
    pub history: Vec<PlanSnapshot>,
}

/// Immutable historical copy of a plan (no nested history)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    pub version: u32,

    #[serde(default)]
    pub sections: Vec<PlanSection>,

    #[serde(default)]
    pub conflicts: Vec<PlanConflict>,
}

impl AccountPlan {
    /// Create an empty version-1 plan
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, company: impl Into<String>) -> Self {
        let plan = Self {
            id: id.into(),
            user_id: user_id.into(),
            company: company.into(),
            goal: String::new(),
            title: None,
            created_at: None,
            updated_at: None,
            version: 1,
            sections: Vec::new(),
            conflicts: Vec::new(),
            history: Vec::new(),
        };
        debug!(plan_id = %plan.id, "AccountPlan::new: created");
        plan
    }

    /// Title for display, falling back to the company, then a placeholder
    pub fn display_title(&self) -> &str {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t.as_str(),
            _ if !self.company.trim().is_empty() => self.company.as_str(),
            _ => "Untitled plan",
        }
    }

    /// Index of the section with this title
    pub fn section_index(&self, title: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.title == title)
    }

    /// Point-in-time copy of this plan without its history
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            company: self.company.clone(),
            goal: self.goal.clone(),
            title: self.title.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            version: self.version,
            sections: self.sections.clone(),
            conflicts: self.conflicts.clone(),
        }
    }

    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &PlanConflict> {
        self.conflicts.iter().filter(|c| !c.is_resolved())
    }
}

impl PlanSnapshot {
    pub fn display_title(&self) -> &str {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t.as_str(),
            _ if !self.company.trim().is_empty() => self.company.as_str(),
            _ => "Untitled plan",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_PLAN: &str = r#"{
        "id": "3f2a",
        "userId": "u1",
        "company": "Nike",
        "goal": "",
        "title": "Nike Digital Strategy",
        "createdAt": "2025-11-20T10:15:30.123456",
        "updatedAt": "2025-11-20T10:20:00.000001",
        "version": 3,
        "sections": [
            {"title": "Overview", "content": "Sportswear leader"},
            {"title": "Financials", "content": {"revenue": "$51B"}}
        ],
        "conflicts": [{"description": "Revenue differs", "status": "unresolved", "source": "web"}],
        "history": [
            {"id": "3f2a", "userId": "u1", "company": "Nike", "version": 1, "sections": []},
            {"id": "3f2a", "userId": "u1", "company": "Nike", "version": 2,
             "sections": [{"title": "Overview", "content": "Sportswear"}]}
        ]
    }"#;

    #[test]
    fn test_deserialize_service_plan() {
        let plan: AccountPlan = serde_json::from_str(SERVICE_PLAN).unwrap();
        assert_eq!(plan.version, 3);
        assert_eq!(plan.sections.len(), 2);
        assert_eq!(plan.history.len(), 2);
        assert_eq!(plan.history[1].version, 2);
        assert_eq!(plan.section_index("Financials"), Some(1));
        assert_eq!(plan.unresolved_conflicts().count(), 1);
    }

    #[test]
    fn test_serialize_round_trips_camel_case() {
        let plan: AccountPlan = serde_json::from_str(SERVICE_PLAN).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["createdAt"], "2025-11-20T10:15:30.123456");
        let back: AccountPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_display_title_fallbacks() {
        let mut plan = AccountPlan::new("p1", "u1", "");
        assert_eq!(plan.display_title(), "Untitled plan");
        plan.company = "Acme".into();
        assert_eq!(plan.display_title(), "Acme");
        plan.title = Some("Acme Expansion".into());
        assert_eq!(plan.display_title(), "Acme Expansion");
    }

    #[test]
    fn test_snapshot_drops_history() {
        let plan: AccountPlan = serde_json::from_str(SERVICE_PLAN).unwrap();
        let snap = plan.snapshot();
        assert_eq!(snap.version, plan.version);
        assert_eq!(snap.sections, plan.sections);
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("history").is_none());
    }
}
