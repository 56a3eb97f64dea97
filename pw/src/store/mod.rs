//! Local plan and session cache
//!
//! Per-user keyed stores with no cross-key transactions. The session runtime
//! writes through them whenever the service hands back a document.

mod error;
mod json;
mod memory;

pub use error::StoreError;
pub use json::JsonFileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountPlan, id};
use crate::versions::normalize_plan;

/// Lightweight record of a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            title: title.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Per-user document store
pub trait PlanRepository: Send + Sync {
    /// Plans for a user, most recently updated first
    fn list_plans(&self, user_id: &str) -> Result<Vec<AccountPlan>, StoreError>;

    fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<AccountPlan, StoreError>;

    fn upsert_plan(&self, plan: &AccountPlan) -> Result<(), StoreError>;

    fn delete_plan(&self, user_id: &str, plan_id: &str) -> Result<(), StoreError>;

    /// Copy a plan under a fresh id with version 1 and no history
    fn duplicate_plan(&self, user_id: &str, plan_id: &str) -> Result<AccountPlan, StoreError> {
        let copy = duplicate_of(&self.get_plan(user_id, plan_id)?);
        self.upsert_plan(&copy)?;
        Ok(copy)
    }

    /// Adopt an exported or legacy document for `user_id`
    ///
    /// The history is cleaned and renumbered first, so the stored plan's
    /// live version follows its last surviving snapshot.
    fn import_plan(&self, user_id: &str, mut plan: AccountPlan) -> Result<AccountPlan, StoreError> {
        if plan.id.trim().is_empty() {
            plan.id = id::generate_id(id::PLAN_PREFIX);
        }
        plan.user_id = user_id.to_string();
        normalize_plan(&mut plan);
        self.upsert_plan(&plan)?;
        Ok(plan)
    }
}

/// Per-user session record store
pub trait SessionRepository: Send + Sync {
    /// Sessions for a user, most recently updated first
    fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>, StoreError>;

    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError>;
}

/// Build the duplicate of a plan
pub fn duplicate_of(plan: &AccountPlan) -> AccountPlan {
    let mut copy = plan.clone();
    copy.id = id::generate_id(id::PLAN_PREFIX);
    copy.version = 1;
    copy.history.clear();
    copy.title = Some(format!("{} (copy)", plan.display_title()));
    copy.created_at = Some(Utc::now().to_rfc3339());
    copy.updated_at = copy.created_at.clone();
    copy
}

/// Most recent first; plans without a timestamp sort last
fn sort_plans(plans: &mut [AccountPlan]) {
    plans.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

fn sort_sessions(sessions: &mut [SessionRecord]) {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_of() {
        let mut plan = AccountPlan::new("p1", "u1", "Acme");
        plan.title = Some("Acme Expansion".into());
        plan.version = 4;
        plan.history.push(plan.snapshot());

        let copy = duplicate_of(&plan);
        assert_ne!(copy.id, plan.id);
        assert!(copy.id.starts_with("plan-"));
        assert_eq!(copy.version, 1);
        assert!(copy.history.is_empty());
        assert_eq!(copy.title.as_deref(), Some("Acme Expansion (copy)"));
        assert_eq!(copy.sections, plan.sections);
    }
}
