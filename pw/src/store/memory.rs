//! In-memory store for tests and throwaway runs

use std::collections::HashMap;
use std::sync::Mutex;

use super::{PlanRepository, SessionRecord, SessionRepository, StoreError, sort_plans, sort_sessions};
use crate::domain::AccountPlan;

/// Mutex-guarded maps keyed by (user, id)
#[derive(Debug, Default)]
pub struct MemoryStore {
    plans: Mutex<HashMap<(String, String), AccountPlan>>,
    sessions: Mutex<HashMap<(String, String), SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock("memory store mutex poisoned".to_string())
}

impl PlanRepository for MemoryStore {
    fn list_plans(&self, user_id: &str) -> Result<Vec<AccountPlan>, StoreError> {
        let plans = self.plans.lock().map_err(poisoned)?;
        let mut out: Vec<AccountPlan> = plans
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, plan)| plan.clone())
            .collect();
        sort_plans(&mut out);
        Ok(out)
    }

    fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<AccountPlan, StoreError> {
        let plans = self.plans.lock().map_err(poisoned)?;
        plans
            .get(&(user_id.to_string(), plan_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::plan_not_found(plan_id))
    }

    fn upsert_plan(&self, plan: &AccountPlan) -> Result<(), StoreError> {
        let mut plans = self.plans.lock().map_err(poisoned)?;
        plans.insert((plan.user_id.clone(), plan.id.clone()), plan.clone());
        Ok(())
    }

    fn delete_plan(&self, user_id: &str, plan_id: &str) -> Result<(), StoreError> {
        let mut plans = self.plans.lock().map_err(poisoned)?;
        plans
            .remove(&(user_id.to_string(), plan_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::plan_not_found(plan_id))
    }
}

impl SessionRepository for MemoryStore {
    fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = self.sessions.lock().map_err(poisoned)?;
        let mut out: Vec<SessionRecord> = sessions
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        sort_sessions(&mut out);
        Ok(out)
    }

    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        sessions.insert((record.user_id.clone(), record.id.clone()), record.clone());
        Ok(())
    }

    fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        sessions
            .remove(&(user_id.to_string(), session_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::session_not_found(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_are_scoped_per_user() {
        let store = MemoryStore::new();
        store.upsert_plan(&AccountPlan::new("p1", "u1", "Acme")).unwrap();
        store.upsert_plan(&AccountPlan::new("p2", "u2", "Globex")).unwrap();

        assert_eq!(store.list_plans("u1").unwrap().len(), 1);
        assert!(store.get_plan("u2", "p1").unwrap_err().is_not_found());
        store.delete_plan("u1", "p1").unwrap();
        assert!(store.delete_plan("u1", "p1").is_err());
    }

    #[test]
    fn test_duplicate_and_sessions() {
        let store = MemoryStore::new();
        store.upsert_plan(&AccountPlan::new("p1", "u1", "Acme")).unwrap();
        let copy = store.duplicate_plan("u1", "p1").unwrap();
        assert_eq!(store.list_plans("u1").unwrap().len(), 2);
        assert_eq!(store.get_plan("u1", &copy.id).unwrap().title.as_deref(), Some("Acme (copy)"));

        store.upsert_session(&SessionRecord::new("p1", "u1", "Acme")).unwrap();
        store.upsert_session(&SessionRecord::new("p1", "u1", "Acme renamed")).unwrap();
        let sessions = store.list_sessions("u1").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "Acme renamed");
        store.delete_session("u1", "p1").unwrap();
        assert!(store.list_sessions("u1").unwrap().is_empty());
    }

    #[test]
    fn test_import_cleans_legacy_history() {
        let store = MemoryStore::new();
        let legacy: AccountPlan = serde_json::from_value(serde_json::json!({
            "id": "legacy-1",
            "company": "Acme",
            "version": 9,
            "sections": [{"title": "Overview", "content": "now"}],
            "history": [
                {"version": 4, "sections": [{"title": "Overview", "content": "draft"}]},
                {"version": 2, "sections": []},
                {"version": 7, "sections": [{"title": "Overview", "content": "review"}]}
            ]
        }))
        .unwrap();

        let imported = store.import_plan("u1", legacy).unwrap();
        assert_eq!(imported.user_id, "u1");
        assert_eq!(imported.version, 3);
        let versions: Vec<u32> = imported.history.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(store.get_plan("u1", "legacy-1").unwrap(), imported);
    }
}
