//! ArtifactStore - document, view pointer and edit buffer

use serde::Serialize;
use tracing::{debug, info, warn};

use super::ArtifactError;
use crate::backend::BackendError;
use crate::domain::{AccountPlan, ContentEdit, ContentPath, PlanSection, PlanSnapshot, SectionContent};
use crate::versions::{self, VersionEntry};

/// Which state of the document is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "version", rename_all = "lowercase")]
pub enum ViewPointer {
    /// The live document
    #[default]
    Current,
    /// A historical snapshot
    Version(u32),
}

/// Owner of the plan document for the active session binding
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    document: Option<AccountPlan>,
    view: ViewPointer,
    edit_buffer: Option<AccountPlan>,
    /// Set by a commit until the service confirms a document
    unsynced: bool,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything (session rebind)
    pub fn reset(&mut self) {
        debug!("reset: called");
        *self = Self::default();
    }

    pub fn document(&self) -> Option<&AccountPlan> {
        self.document.as_ref()
    }

    pub fn view(&self) -> ViewPointer {
        self.view
    }

    pub fn is_editing(&self) -> bool {
        self.edit_buffer.is_some()
    }

    pub fn edit_buffer(&self) -> Option<&AccountPlan> {
        self.edit_buffer.as_ref()
    }

    /// True while a committed edit has not been confirmed by the service
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }

    /// Accept an authoritative document from the service
    ///
    /// A historical view survives only if that version still exists and is
    /// not the live one. An open edit buffer is kept.
    pub fn receive_document(&mut self, plan: AccountPlan) {
        debug!(plan_id = %plan.id, version = plan.version, "receive_document: called");
        let stale = match self.view {
            ViewPointer::Version(v) => v == plan.version || versions::find_snapshot(&plan, v).is_none(),
            ViewPointer::Current => false,
        };
        if stale {
            self.view = ViewPointer::Current;
        }
        if self.edit_buffer.is_some() {
            warn!(plan_id = %plan.id, "receive_document: document replaced during edit");
        }
        self.document = Some(plan);
        self.unsynced = false;
    }

    /// Version listing for the loaded document
    pub fn versions(&self) -> Vec<VersionEntry> {
        self.document.as_ref().map(versions::list_versions).unwrap_or_default()
    }

    /// Point the view at a version; the live version normalizes to Current
    pub fn select_version(&mut self, version: u32) -> Result<ViewPointer, ArtifactError> {
        debug!(version, "select_version: called");
        let doc = self.document.as_ref().ok_or(ArtifactError::NoDocument)?;
        if self.edit_buffer.is_some() {
            return Err(ArtifactError::AlreadyEditing);
        }
        if !versions::has_version(doc, version) {
            return Err(ArtifactError::UnknownVersion(version));
        }
        self.view = if version == doc.version {
            ViewPointer::Current
        } else {
            ViewPointer::Version(version)
        };
        Ok(self.view)
    }

    pub fn select_current(&mut self) {
        self.view = ViewPointer::Current;
    }

    /// The state the view pointer designates; edits in progress are not shown
    pub fn displayed(&self) -> Option<PlanSnapshot> {
        let doc = self.document.as_ref()?;
        match self.view {
            ViewPointer::Current => Some(doc.snapshot()),
            ViewPointer::Version(v) => versions::find_snapshot(doc, v).cloned(),
        }
    }

    /// Enter edit mode with a deep copy of the live document
    pub fn start_edit(&mut self) -> Result<&AccountPlan, ArtifactError> {
        debug!("start_edit: called");
        if self.edit_buffer.is_some() {
            return Err(ArtifactError::AlreadyEditing);
        }
        let doc = self.document.as_ref().ok_or(ArtifactError::NoDocument)?;
        self.view = ViewPointer::Current;
        let buffer = self.edit_buffer.insert(doc.clone());
        info!(plan_id = %buffer.id, version = buffer.version, "start_edit: editing");
        Ok(buffer)
    }

    fn buffer_mut(&mut self) -> Result<&mut AccountPlan, ArtifactError> {
        self.edit_buffer.as_mut().ok_or(ArtifactError::NotEditing)
    }

    fn section_mut(&mut self, index: usize) -> Result<&mut PlanSection, ArtifactError> {
        self.buffer_mut()?
            .sections
            .get_mut(index)
            .ok_or(ArtifactError::SectionOutOfRange(index))
    }

    /// Replace one section's whole content
    pub fn set_section_content(&mut self, index: usize, content: SectionContent) -> Result<(), ArtifactError> {
        debug!(index, kind = content.kind(), "set_section_content: called");
        self.section_mut(index)?.content = content;
        Ok(())
    }

    /// Replace a nested node of one section's content
    pub fn edit_section_at(
        &mut self,
        index: usize,
        path: &ContentPath,
        edit: ContentEdit,
    ) -> Result<(), ArtifactError> {
        debug!(index, %path, ?edit, "edit_section_at: called");
        self.section_mut(index)?.content.apply(path, edit)?;
        Ok(())
    }

    /// Append a section; titles must be unique
    pub fn add_section(&mut self, title: &str, content: SectionContent) -> Result<usize, ArtifactError> {
        debug!(%title, "add_section: called");
        let title = title.trim();
        if title.is_empty() {
            return Err(ArtifactError::EmptyTitle);
        }
        let buffer = self.buffer_mut()?;
        if buffer.section_index(title).is_some() {
            return Err(ArtifactError::DuplicateSection(title.to_string()));
        }
        buffer.sections.push(PlanSection::new(title, content));
        Ok(buffer.sections.len() - 1)
    }

    pub fn remove_section(&mut self, index: usize) -> Result<PlanSection, ArtifactError> {
        debug!(index, "remove_section: called");
        let buffer = self.buffer_mut()?;
        if index >= buffer.sections.len() {
            return Err(ArtifactError::SectionOutOfRange(index));
        }
        Ok(buffer.sections.remove(index))
    }

    pub fn rename_section(&mut self, index: usize, title: &str) -> Result<(), ArtifactError> {
        debug!(index, %title, "rename_section: called");
        let title = title.trim();
        if title.is_empty() {
            return Err(ArtifactError::EmptyTitle);
        }
        let buffer = self.buffer_mut()?;
        if buffer.section_index(title).is_some_and(|i| i != index) {
            return Err(ArtifactError::DuplicateSection(title.to_string()));
        }
        let section = buffer
            .sections
            .get_mut(index)
            .ok_or(ArtifactError::SectionOutOfRange(index))?;
        section.title = title.to_string();
        Ok(())
    }

    pub fn set_title(&mut self, title: Option<String>) -> Result<(), ArtifactError> {
        debug!(?title, "set_title: called");
        self.buffer_mut()?.title = title;
        Ok(())
    }

    /// Leave edit mode without touching the live document
    pub fn cancel_edit(&mut self) -> Result<(), ArtifactError> {
        debug!("cancel_edit: called");
        self.edit_buffer.take().map(|_| ()).ok_or(ArtifactError::NotEditing)
    }

    /// Optimistically install the edit buffer as the live document
    ///
    /// Exits edit mode and returns the document to persist. The store stays
    /// unsynced until [`finish_commit`](Self::finish_commit) succeeds or the
    /// service sends a newer document.
    pub fn begin_commit(&mut self) -> Result<AccountPlan, ArtifactError> {
        debug!("begin_commit: called");
        let buffer = self.edit_buffer.take().ok_or(ArtifactError::NotEditing)?;
        self.document = Some(buffer.clone());
        self.view = ViewPointer::Current;
        self.unsynced = true;
        info!(plan_id = %buffer.id, "begin_commit: optimistic replace");
        Ok(buffer)
    }

    /// Apply the outcome of persisting a committed document
    ///
    /// On success the service's version, history and timestamp are adopted.
    /// On failure the optimistic document is kept.
    pub fn finish_commit(&mut self, result: Result<AccountPlan, BackendError>) -> Result<&AccountPlan, ArtifactError> {
        match result {
            Ok(saved) => {
                debug!(plan_id = %saved.id, version = saved.version, "finish_commit: saved");
                let doc = self.document.as_mut().ok_or(ArtifactError::NoDocument)?;
                if doc.id == saved.id {
                    doc.version = saved.version.max(doc.version);
                    doc.history = saved.history;
                    doc.updated_at = saved.updated_at.or(doc.updated_at.take());
                }
                self.unsynced = false;
                Ok(doc)
            }
            Err(e) => {
                warn!(error = %e, "finish_commit: persist failed, keeping local document");
                Err(ArtifactError::CommitFailed(e))
            }
        }
    }
}
