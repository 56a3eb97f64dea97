//! File-backed store: one JSON document per plan plus a session index
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<user>/plans/<plan-id>.json
//! <root>/<user>/sessions.json
//! <root>/<user>/.lock
//! ```
//!
//! Writes go to a temp file and are renamed into place while holding an
//! exclusive advisory lock on the user directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use super::{PlanRepository, SessionRecord, SessionRepository, StoreError, sort_plans, sort_sessions};
use crate::domain::AccountPlan;

/// JSON file store rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

/// Exclusive lock on a user directory, released on drop
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(".lock"))?;
        file.lock_exclusive()
            .map_err(|e| StoreError::Lock(format!("Failed to lock {}: {}", dir.display(), e)))?;
        Ok(Self { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "DirLock::drop: unlock failed");
        }
    }
}

/// Reject keys that would escape their directory
fn check_key(key: &str) -> Result<&str, StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "JsonFileStore::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(check_key(user_id)?))
    }

    fn plan_path(&self, user_id: &str, plan_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .user_dir(user_id)?
            .join("plans")
            .join(format!("{}.json", check_key(plan_id)?)))
    }

    fn read_sessions(path: &Path) -> Result<Vec<SessionRecord>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl PlanRepository for JsonFileStore {
    fn list_plans(&self, user_id: &str) -> Result<Vec<AccountPlan>, StoreError> {
        debug!(%user_id, "list_plans: called");
        let dir = self.user_dir(user_id)?;
        let _lock = DirLock::acquire(&dir)?;
        let plans_dir = dir.join("plans");
        if !plans_dir.exists() {
            return Ok(Vec::new());
        }

        let mut plans = Vec::new();
        for entry in fs::read_dir(&plans_dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<AccountPlan>(&content) {
                Ok(plan) => plans.push(plan),
                Err(e) => warn!(path = %path.display(), error = %e, "list_plans: skipping unreadable plan"),
            }
        }
        sort_plans(&mut plans);
        Ok(plans)
    }

    fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<AccountPlan, StoreError> {
        debug!(%user_id, %plan_id, "get_plan: called");
        let path = self.plan_path(user_id, plan_id)?;
        let _lock = DirLock::acquire(&self.user_dir(user_id)?)?;
        if !path.exists() {
            return Err(StoreError::plan_not_found(plan_id));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn upsert_plan(&self, plan: &AccountPlan) -> Result<(), StoreError> {
        debug!(user_id = %plan.user_id, plan_id = %plan.id, version = plan.version, "upsert_plan: called");
        let path = self.plan_path(&plan.user_id, &plan.id)?;
        let _lock = DirLock::acquire(&self.user_dir(&plan.user_id)?)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, &serde_json::to_vec_pretty(plan)?)
    }

    fn delete_plan(&self, user_id: &str, plan_id: &str) -> Result<(), StoreError> {
        debug!(%user_id, %plan_id, "delete_plan: called");
        let path = self.plan_path(user_id, plan_id)?;
        let _lock = DirLock::acquire(&self.user_dir(user_id)?)?;
        if !path.exists() {
            return Err(StoreError::plan_not_found(plan_id));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}

impl SessionRepository for JsonFileStore {
    fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        debug!(%user_id, "list_sessions: called");
        let dir = self.user_dir(user_id)?;
        let _lock = DirLock::acquire(&dir)?;
        let mut sessions = Self::read_sessions(&dir.join("sessions.json"))?;
        sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        debug!(user_id = %record.user_id, session_id = %record.id, "upsert_session: called");
        let dir = self.user_dir(&record.user_id)?;
        let _lock = DirLock::acquire(&dir)?;
        let path = dir.join("sessions.json");
        let mut sessions = Self::read_sessions(&path)?;
        match sessions.iter_mut().find(|s| s.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => sessions.push(record.clone()),
        }
        write_atomic(&path, &serde_json::to_vec_pretty(&sessions)?)
    }

    fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        debug!(%user_id, %session_id, "delete_session: called");
        let dir = self.user_dir(user_id)?;
        let _lock = DirLock::acquire(&dir)?;
        let path = dir.join("sessions.json");
        let mut sessions = Self::read_sessions(&path)?;
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        if sessions.len() == before {
            return Err(StoreError::session_not_found(session_id));
        }
        write_atomic(&path, &serde_json::to_vec_pretty(&sessions)?)
    }
}
