//! Session runtime messages
//!
//! Commands for the actor pattern. User-facing commands carry a oneshot
//! reply; completion commands are sent back by the runtime's own spawned
//! tasks and carry the binding generation they were issued for.

use std::path::PathBuf;

use tokio::sync::oneshot;

use super::SessionResponse;
use super::controller::{ContinuationTicket, SessionSnapshot};
use crate::artifact::ViewPointer;
use crate::backend::{BackendError, ChatResponse, HistoryResponse};
use crate::domain::{
    AccountPlan, AttachedFile, ContentEdit, ContentPath, PlanSection, PlanSnapshot, ResearchStatus, SectionContent,
};
use crate::mention::MentionSelection;
use crate::versions::VersionEntry;

/// Pending and known files for the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFiles {
    pub pending: Vec<AttachedFile>,
    pub known: Vec<AttachedFile>,
}

/// Commands sent to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    // Conversation
    SendMessage {
        text: String,
        reply: oneshot::Sender<SessionResponse<ResearchStatus>>,
    },
    OpenPlan {
        plan_id: String,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    NewPlan {
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    // Attachments
    UpdateMention {
        input: String,
        caret: usize,
        reply: oneshot::Sender<Vec<AttachedFile>>,
    },
    SelectMention {
        input: String,
        file: AttachedFile,
        reply: oneshot::Sender<Option<MentionSelection>>,
    },
    AttachFile {
        file: AttachedFile,
        reply: oneshot::Sender<bool>,
    },
    DetachFile {
        file_id: String,
        reply: oneshot::Sender<bool>,
    },
    UploadFile {
        path: PathBuf,
        reply: oneshot::Sender<SessionResponse<AttachedFile>>,
    },
    AttachMentioned {
        text: String,
        reply: oneshot::Sender<Vec<AttachedFile>>,
    },
    Files {
        reply: oneshot::Sender<SessionFiles>,
    },

    // Document and versions
    Versions {
        reply: oneshot::Sender<Vec<VersionEntry>>,
    },
    SelectVersion {
        version: Option<u32>,
        reply: oneshot::Sender<SessionResponse<ViewPointer>>,
    },
    DisplayedPlan {
        reply: oneshot::Sender<Option<PlanSnapshot>>,
    },
    EditBuffer {
        reply: oneshot::Sender<Option<AccountPlan>>,
    },
    StartEdit {
        reply: oneshot::Sender<SessionResponse<AccountPlan>>,
    },
    EditSection {
        index: usize,
        content: SectionContent,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    EditSectionAt {
        index: usize,
        path: ContentPath,
        edit: ContentEdit,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    AddSection {
        title: String,
        content: SectionContent,
        reply: oneshot::Sender<SessionResponse<usize>>,
    },
    RemoveSection {
        index: usize,
        reply: oneshot::Sender<SessionResponse<PlanSection>>,
    },
    RenameSection {
        index: usize,
        title: String,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    SetTitle {
        title: Option<String>,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    CancelEdit {
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    CommitEdit {
        reply: oneshot::Sender<SessionResponse<AccountPlan>>,
    },

    // Completions from spawned tasks
    ChatCompleted {
        generation: u64,
        result: Result<ChatResponse, BackendError>,
    },
    HistoryLoaded {
        generation: u64,
        result: Result<HistoryResponse, BackendError>,
    },
    CommitCompleted {
        generation: u64,
        result: Result<AccountPlan, BackendError>,
        reply: oneshot::Sender<SessionResponse<AccountPlan>>,
    },
    UploadCompleted {
        generation: u64,
        result: SessionResponse<AttachedFile>,
        reply: oneshot::Sender<SessionResponse<AttachedFile>>,
    },
    Continue {
        ticket: ContinuationTicket,
    },

    Shutdown,
}
