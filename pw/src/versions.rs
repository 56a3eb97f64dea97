//! Snapshot repository - pure functions over a plan's version history
//!
//! Nothing here performs I/O or mutates a live plan. The live document is
//! always the "current" version, even when a history entry shares its
//! version number.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::domain::{AccountPlan, PlanSnapshot};

/// One row of a version listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    pub version: u32,
    pub title: String,
    pub updated_at: Option<String>,
    pub section_count: usize,
    pub is_current: bool,
}

impl VersionEntry {
    fn from_snapshot(snapshot: &PlanSnapshot, live_version: u32) -> Self {
        Self {
            version: snapshot.version,
            title: snapshot.display_title().to_string(),
            updated_at: snapshot.updated_at.clone(),
            section_count: snapshot.sections.len(),
            is_current: snapshot.version == live_version,
        }
    }
}

/// List every version of a plan, ascending, with the live version marked current
///
/// Candidates are `history ∪ {live}`, de-duplicated by version number with
/// later entries winning, so the live document overrides any history entry
/// that shares its version.
pub fn list_versions(plan: &AccountPlan) -> Vec<VersionEntry> {
    debug!(plan_id = %plan.id, history = plan.history.len(), "list_versions: called");
    let live = plan.snapshot();
    let mut by_version: BTreeMap<u32, VersionEntry> = BTreeMap::new();
    for snapshot in plan.history.iter().chain(std::iter::once(&live)) {
        by_version.insert(snapshot.version, VersionEntry::from_snapshot(snapshot, plan.version));
    }
    by_version.into_values().collect()
}

/// Historical snapshot for a version; the last entry wins on duplicates
pub fn find_snapshot(plan: &AccountPlan, version: u32) -> Option<&PlanSnapshot> {
    plan.history.iter().rev().find(|s| s.version == version)
}

/// True if `version` is the live version or present in history
pub fn has_version(plan: &AccountPlan, version: u32) -> bool {
    plan.version == version || find_snapshot(plan, version).is_some()
}

/// Clean up a legacy history list
///
/// Drops snapshots with no sections, de-duplicates by version keeping the
/// last occurrence, sorts ascending and renumbers `1..=n`. Returns the
/// cleaned history and the version the live document should carry (`n + 1`).
pub fn normalize_history(history: Vec<PlanSnapshot>) -> (Vec<PlanSnapshot>, u32) {
    debug!(entries = history.len(), "normalize_history: called");
    let mut by_version: BTreeMap<u32, PlanSnapshot> = BTreeMap::new();
    for snapshot in history.into_iter().filter(|s| !s.sections.is_empty()) {
        by_version.insert(snapshot.version, snapshot);
    }

    let cleaned: Vec<PlanSnapshot> = by_version
        .into_values()
        .enumerate()
        .map(|(i, mut snapshot)| {
            snapshot.version = i as u32 + 1;
            snapshot
        })
        .collect();
    let next = cleaned.len() as u32 + 1;
    debug!(kept = cleaned.len(), next, "normalize_history: done");
    (cleaned, next)
}

/// Apply [`normalize_history`] to a plan in place
pub fn normalize_plan(plan: &mut AccountPlan) {
    let (history, next) = normalize_history(std::mem::take(&mut plan.history));
    plan.history = history;
    plan.version = next;
}
