//! SessionRuntime - actor that owns one user's session state
//!
//! The actor processes one command at a time. Network calls run as spawned
//! tasks whose completions are sent back as commands tagged with the binding
//! generation; anything that completes after a rebind is dropped. Research
//! continuations are spawned sleeps that re-enter the actor the same way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::controller::{ContinuationTicket, Outgoing, ResponseOutcome, SessionController, SessionSnapshot};
use super::events::SessionEvent;
use super::messages::{SessionCommand, SessionFiles};
use super::{SessionError, SessionResponse};
use crate::artifact::{ArtifactStore, ViewPointer};
use crate::auth::UserContext;
use crate::backend::{BackendError, ChatResponse, ResearchBackend};
use crate::config::ResearchConfig;
use crate::domain::{
    AccountPlan, AttachedFile, ContentEdit, ContentPath, PlanSection, PlanSnapshot, ResearchStatus, SectionContent,
    SessionBinding,
};
use crate::mention::{AttachmentResolver, MentionSelection};
use crate::store::{PlanRepository, SessionRecord, SessionRepository};
use crate::versions::VersionEntry;

/// Local persistence used by a session
#[derive(Clone)]
pub struct Repositories {
    pub plans: Arc<dyn PlanRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Repositories {
    /// Use one store for both plans and session records
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: PlanRepository + SessionRepository + 'static,
    {
        Self {
            plans: store.clone(),
            sessions: store,
        }
    }
}

/// Spawns session actors
pub struct SessionRuntime;

impl SessionRuntime {
    /// Spawn a session actor for a signed-in user
    ///
    /// The session starts as a brand-new plan with the new-plan welcome.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        user: UserContext,
        backend: Arc<dyn ResearchBackend>,
        repos: Repositories,
        config: ResearchConfig,
    ) -> SessionHandle {
        debug!(user_id = %user.user_id, "spawn: called");
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let mut controller = SessionController::new(user, config.continuation_message.clone());
        controller.start_new(Utc::now());

        let actor = SessionActor {
            controller,
            artifacts: ArtifactStore::new(),
            attachments: AttachmentResolver::new(),
            backend,
            repos,
            config,
            events: event_tx.clone(),
            tx: tx.downgrade(),
            send_reply: None,
            open_reply: None,
        };
        tokio::spawn(actor.run(rx));

        info!("SessionRuntime spawned");
        SessionHandle { tx, event_tx }
    }
}

/// Handle to send commands to a session actor
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> SessionResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    // === Conversation ===

    /// Send a user message; resolves once the first response is applied
    ///
    /// Returns the research status the service reported. A `Researching`
    /// status means hidden continuations are now running in the background.
    pub async fn send_message(&self, text: &str) -> SessionResponse<ResearchStatus> {
        debug!(len = text.len(), "send_message: called");
        let text = text.to_string();
        self.request(|reply| SessionCommand::SendMessage { text, reply }).await?
    }

    /// Rebind to a persisted plan; resolves once history is loaded
    pub async fn open_plan(&self, plan_id: &str) -> SessionResponse<()> {
        debug!(%plan_id, "open_plan: called");
        let plan_id = plan_id.to_string();
        self.request(|reply| SessionCommand::OpenPlan { plan_id, reply }).await?
    }

    /// Rebind to a brand-new plan
    pub async fn new_plan(&self) -> SessionResponse<()> {
        debug!("new_plan: called");
        self.request(|reply| SessionCommand::NewPlan { reply }).await?
    }

    pub async fn snapshot(&self) -> SessionResponse<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    // === Attachments ===

    /// Re-scan the input for an open `@` token; returns candidates
    pub async fn update_mention(&self, input: &str, caret: usize) -> SessionResponse<Vec<AttachedFile>> {
        let input = input.to_string();
        self.request(|reply| SessionCommand::UpdateMention { input, caret, reply })
            .await
    }

    pub async fn select_mention(&self, input: &str, file: AttachedFile) -> SessionResponse<Option<MentionSelection>> {
        let input = input.to_string();
        self.request(|reply| SessionCommand::SelectMention { input, file, reply })
            .await
    }

    pub async fn attach_file(&self, file: AttachedFile) -> SessionResponse<bool> {
        debug!(file_id = %file.id, "attach_file: called");
        self.request(|reply| SessionCommand::AttachFile { file, reply }).await
    }

    pub async fn detach_file(&self, file_id: &str) -> SessionResponse<bool> {
        debug!(%file_id, "detach_file: called");
        let file_id = file_id.to_string();
        self.request(|reply| SessionCommand::DetachFile { file_id, reply }).await
    }

    /// Upload a local file and add it to the pending set
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> SessionResponse<AttachedFile> {
        let path: PathBuf = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "upload_file: called");
        self.request(|reply| SessionCommand::UploadFile { path, reply }).await?
    }

    /// Bind every known file referenced as `@filename` in `text`
    pub async fn attach_mentioned(&self, text: &str) -> SessionResponse<Vec<AttachedFile>> {
        let text = text.to_string();
        self.request(|reply| SessionCommand::AttachMentioned { text, reply }).await
    }

    pub async fn files(&self) -> SessionResponse<SessionFiles> {
        self.request(|reply| SessionCommand::Files { reply }).await
    }

    // === Document and versions ===

    pub async fn versions(&self) -> SessionResponse<Vec<VersionEntry>> {
        self.request(|reply| SessionCommand::Versions { reply }).await
    }

    /// Point the view at a version; None selects the live document
    pub async fn select_version(&self, version: Option<u32>) -> SessionResponse<ViewPointer> {
        debug!(?version, "select_version: called");
        self.request(|reply| SessionCommand::SelectVersion { version, reply })
            .await?
    }

    pub async fn displayed_plan(&self) -> SessionResponse<Option<PlanSnapshot>> {
        self.request(|reply| SessionCommand::DisplayedPlan { reply }).await
    }

    pub async fn edit_buffer(&self) -> SessionResponse<Option<AccountPlan>> {
        self.request(|reply| SessionCommand::EditBuffer { reply }).await
    }

    pub async fn start_edit(&self) -> SessionResponse<AccountPlan> {
        debug!("start_edit: called");
        self.request(|reply| SessionCommand::StartEdit { reply }).await?
    }

    pub async fn edit_section(&self, index: usize, content: SectionContent) -> SessionResponse<()> {
        self.request(|reply| SessionCommand::EditSection { index, content, reply })
            .await?
    }

    /// Apply a structural edit to a node inside section `index`
    pub async fn edit_section_at(&self, index: usize, path: ContentPath, edit: ContentEdit) -> SessionResponse<()> {
        self.request(|reply| SessionCommand::EditSectionAt {
            index,
            path,
            edit,
            reply,
        })
        .await?
    }

    pub async fn add_section(&self, title: &str, content: SectionContent) -> SessionResponse<usize> {
        let title = title.to_string();
        self.request(|reply| SessionCommand::AddSection { title, content, reply })
            .await?
    }

    pub async fn remove_section(&self, index: usize) -> SessionResponse<PlanSection> {
        self.request(|reply| SessionCommand::RemoveSection { index, reply }).await?
    }

    pub async fn rename_section(&self, index: usize, title: &str) -> SessionResponse<()> {
        let title = title.to_string();
        self.request(|reply| SessionCommand::RenameSection { index, title, reply })
            .await?
    }

    pub async fn set_title(&self, title: Option<String>) -> SessionResponse<()> {
        self.request(|reply| SessionCommand::SetTitle { title, reply }).await?
    }

    pub async fn cancel_edit(&self) -> SessionResponse<()> {
        debug!("cancel_edit: called");
        self.request(|reply| SessionCommand::CancelEdit { reply }).await?
    }

    /// Commit the edit buffer; resolves once the service has answered
    ///
    /// The live document is replaced before the service is called and is not
    /// reverted if the call fails.
    pub async fn commit_edit(&self) -> SessionResponse<AccountPlan> {
        debug!("commit_edit: called");
        self.request(|reply| SessionCommand::CommitEdit { reply }).await?
    }

    /// Stop the actor (sign-out)
    pub async fn shutdown(&self) -> SessionResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// State owned by the actor task
struct SessionActor {
    controller: SessionController,
    artifacts: ArtifactStore,
    attachments: AttachmentResolver,
    backend: Arc<dyn ResearchBackend>,
    repos: Repositories,
    config: ResearchConfig,
    events: broadcast::Sender<SessionEvent>,
    /// Weak so the actor stops once every handle is dropped
    tx: mpsc::WeakSender<SessionCommand>,
    send_reply: Option<oneshot::Sender<SessionResponse<ResearchStatus>>>,
    open_reply: Option<oneshot::Sender<SessionResponse<()>>>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        debug!("SessionActor started");
        while let Some(cmd) = rx.recv().await {
            if matches!(cmd, SessionCommand::Shutdown) {
                debug!("run: Shutdown command");
                break;
            }
            self.handle(cmd);
        }
        self.fail_pending();
        info!("SessionActor stopped");
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_document(&self) {
        let doc = self.artifacts.document();
        self.emit(SessionEvent::DocumentChanged {
            plan_id: doc.map(|d| d.id.clone()),
            version: doc.map(|d| d.version),
        });
    }

    /// Run a future and send its result back to the actor as a command
    fn spawn_completion<F>(&self, fut: F)
    where
        F: std::future::Future<Output = SessionCommand> + Send + 'static,
    {
        let Some(tx) = self.tx.upgrade() else {
            debug!("spawn_completion: actor shutting down");
            return;
        };
        tokio::spawn(async move {
            let cmd = fut.await;
            if tx.send(cmd).await.is_err() {
                debug!("spawn_completion: actor gone");
            }
        });
    }

    fn fail_pending(&mut self) {
        if let Some(reply) = self.send_reply.take() {
            let _ = reply.send(Err(SessionError::Stale));
        }
        if let Some(reply) = self.open_reply.take() {
            let _ = reply.send(Err(SessionError::Stale));
        }
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SendMessage { text, reply } => {
                debug!("handle: SendMessage command");
                match self
                    .controller
                    .prepare_send(&text, false, &mut self.attachments, Utc::now())
                {
                    Ok(outgoing) => {
                        self.send_reply = Some(reply);
                        self.emit(SessionEvent::TranscriptChanged {
                            len: self.controller.transcript().len(),
                        });
                        self.emit(SessionEvent::ProgressUpdated { progress: None });
                        self.dispatch(outgoing);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            SessionCommand::OpenPlan { plan_id, reply } => {
                debug!(%plan_id, "handle: OpenPlan command");
                self.fail_pending();
                self.rebind(SessionBinding::Plan(plan_id.clone()));
                self.load_cached_plan(&plan_id);
                self.open_reply = Some(reply);
                let session_key = self
                    .controller
                    .binding()
                    .session_key()
                    .unwrap_or(plan_id.as_str())
                    .to_string();
                let backend = self.backend.clone();
                let generation = self.controller.generation();
                self.spawn_completion(async move {
                    let result = backend.fetch_history(&session_key).await;
                    SessionCommand::HistoryLoaded { generation, result }
                });
            }

            SessionCommand::NewPlan { reply } => {
                debug!("handle: NewPlan command");
                self.fail_pending();
                self.artifacts.reset();
                self.attachments.reset();
                let generation = self.controller.start_new(Utc::now());
                self.emit(SessionEvent::BindingChanged {
                    binding: self.controller.binding().clone(),
                    generation,
                });
                self.emit(SessionEvent::TranscriptChanged {
                    len: self.controller.transcript().len(),
                });
                self.emit_research_reset();
                self.emit_document();
                let _ = reply.send(Ok(()));
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot());
            }

            SessionCommand::UpdateMention { input, caret, reply } => {
                let _ = reply.send(self.attachments.update_input(&input, caret));
            }

            SessionCommand::SelectMention { input, file, reply } => {
                debug!(file_id = %file.id, "handle: SelectMention command");
                let _ = reply.send(self.attachments.select(&input, &file));
            }

            SessionCommand::AttachFile { file, reply } => {
                let _ = reply.send(self.attachments.attach(file));
            }

            SessionCommand::DetachFile { file_id, reply } => {
                let _ = reply.send(self.attachments.detach(&file_id));
            }

            SessionCommand::UploadFile { path, reply } => {
                debug!(path = %path.display(), "handle: UploadFile command");
                let backend = self.backend.clone();
                let generation = self.controller.generation();
                self.spawn_completion(async move {
                    let result = upload(backend, path).await;
                    SessionCommand::UploadCompleted {
                        generation,
                        result,
                        reply,
                    }
                });
            }

            SessionCommand::UploadCompleted {
                generation,
                result,
                reply,
            } => {
                if generation != self.controller.generation() {
                    debug!(generation, "handle: UploadCompleted stale");
                    let _ = reply.send(Err(SessionError::Stale));
                    return;
                }
                if let Ok(file) = &result {
                    info!(file_id = %file.id, filename = %file.filename, "handle: file uploaded");
                    self.attachments.attach(file.clone());
                }
                let _ = reply.send(result);
            }

            SessionCommand::AttachMentioned { text, reply } => {
                let mentioned = self.attachments.mentioned_in(&text);
                let added = mentioned
                    .into_iter()
                    .filter(|f| self.attachments.attach(f.clone()))
                    .collect();
                let _ = reply.send(added);
            }

            SessionCommand::Files { reply } => {
                let _ = reply.send(SessionFiles {
                    pending: self.attachments.pending().to_vec(),
                    known: self.attachments.known().to_vec(),
                });
            }

            SessionCommand::Versions { reply } => {
                let _ = reply.send(self.artifacts.versions());
            }

            SessionCommand::SelectVersion { version, reply } => {
                debug!(?version, "handle: SelectVersion command");
                let result = match version {
                    Some(v) => self.artifacts.select_version(v).map_err(SessionError::from),
                    None => {
                        self.artifacts.select_current();
                        Ok(ViewPointer::Current)
                    }
                };
                if result.is_ok() {
                    self.emit_document();
                }
                let _ = reply.send(result);
            }

            SessionCommand::DisplayedPlan { reply } => {
                let _ = reply.send(self.artifacts.displayed());
            }

            SessionCommand::EditBuffer { reply } => {
                let _ = reply.send(self.artifacts.edit_buffer().cloned());
            }

            SessionCommand::StartEdit { reply } => {
                let result = self.artifacts.start_edit().cloned().map_err(SessionError::from);
                let _ = reply.send(result);
            }

            SessionCommand::EditSection { index, content, reply } => {
                let result = self.artifacts.set_section_content(index, content);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::EditSectionAt {
                index,
                path,
                edit,
                reply,
            } => {
                let result = self.artifacts.edit_section_at(index, &path, edit);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::AddSection { title, content, reply } => {
                let result = self.artifacts.add_section(&title, content);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::RemoveSection { index, reply } => {
                let result = self.artifacts.remove_section(index);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::RenameSection { index, title, reply } => {
                let result = self.artifacts.rename_section(index, &title);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::SetTitle { title, reply } => {
                let result = self.artifacts.set_title(title);
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::CancelEdit { reply } => {
                let _ = reply.send(self.artifacts.cancel_edit().map_err(SessionError::from));
            }

            SessionCommand::CommitEdit { reply } => {
                debug!("handle: CommitEdit command");
                let buffer = match self.artifacts.begin_commit() {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        return;
                    }
                };
                self.emit_document();
                let backend = self.backend.clone();
                let generation = self.controller.generation();
                self.spawn_completion(async move {
                    let result = backend.update_plan(&buffer.id, &buffer).await;
                    SessionCommand::CommitCompleted {
                        generation,
                        result,
                        reply,
                    }
                });
            }

            SessionCommand::CommitCompleted {
                generation,
                result,
                reply,
            } => {
                self.handle_commit_completed(generation, result, reply);
            }

            SessionCommand::ChatCompleted { generation, result } => {
                self.handle_chat_completed(generation, result);
            }

            SessionCommand::HistoryLoaded { generation, result } => {
                debug!(generation, ok = result.is_ok(), "handle: HistoryLoaded command");
                let Some(files) = self.controller.apply_history(generation, result, Utc::now()) else {
                    return;
                };
                self.attachments.set_known(files);
                self.emit(SessionEvent::TranscriptChanged {
                    len: self.controller.transcript().len(),
                });
                if let Some(reply) = self.open_reply.take() {
                    let _ = reply.send(Ok(()));
                }
            }

            SessionCommand::Continue { ticket } => {
                debug!(?ticket, "handle: Continue command");
                if let Some(outgoing) = self
                    .controller
                    .continuation(ticket, &mut self.attachments, Utc::now())
                {
                    self.dispatch(outgoing);
                }
            }

            SessionCommand::Shutdown => {}
        }
    }

    /// Reset every owned component onto a new binding
    fn rebind(&mut self, binding: SessionBinding) {
        self.artifacts.reset();
        self.attachments.reset();
        let generation = self.controller.rebind(binding);
        self.emit(SessionEvent::BindingChanged {
            binding: self.controller.binding().clone(),
            generation,
        });
        self.emit(SessionEvent::TranscriptChanged { len: 0 });
        self.emit_research_reset();
    }

    fn emit_research_reset(&self) {
        self.emit(SessionEvent::ResearchStatusChanged {
            status: ResearchStatus::Idle,
        });
        self.emit(SessionEvent::ProgressUpdated { progress: None });
    }

    /// Show the locally cached copy while the session loads
    fn load_cached_plan(&mut self, plan_id: &str) {
        let user_id = self.controller.user().user_id.clone();
        match self.repos.plans.get_plan(&user_id, plan_id) {
            Ok(plan) => {
                self.record_session(&plan);
                self.artifacts.receive_document(plan);
                self.emit_document();
            }
            Err(e) if e.is_not_found() => debug!(%plan_id, "load_cached_plan: not cached"),
            Err(e) => warn!(%plan_id, error = %e, "load_cached_plan: store read failed"),
        }
    }

    fn record_session(&self, plan: &AccountPlan) {
        let record = SessionRecord::new(&plan.id, &plan.user_id, plan.display_title());
        if let Err(e) = self.repos.sessions.upsert_session(&record) {
            warn!(plan_id = %plan.id, error = %e, "record_session: store write failed");
        }
    }

    fn cache_plan(&self, plan: &AccountPlan) {
        if let Err(e) = self.repos.plans.upsert_plan(plan) {
            warn!(plan_id = %plan.id, error = %e, "cache_plan: store write failed");
        }
    }

    fn dispatch(&self, outgoing: Outgoing) {
        debug!(
            generation = outgoing.generation,
            hidden = outgoing.hidden,
            "dispatch: sending message"
        );
        let backend = self.backend.clone();
        let Outgoing {
            generation, request, ..
        } = outgoing;
        self.spawn_completion(async move {
            let result = backend.send_message(request).await;
            SessionCommand::ChatCompleted { generation, result }
        });
    }

    fn handle_chat_completed(
        &mut self,
        generation: u64,
        result: Result<ChatResponse, BackendError>,
    ) {
        let now = Utc::now();
        match result {
            Ok(response) => {
                let Some(outcome) = self.controller.apply_response(generation, response, now) else {
                    return;
                };
                self.apply_outcome(outcome);
                if let Some(reply) = self.send_reply.take() {
                    let _ = reply.send(Ok(self.controller.status()));
                }
            }
            Err(e) => {
                if !self.controller.apply_failure(generation, &e, now) {
                    return;
                }
                self.emit(SessionEvent::TranscriptChanged {
                    len: self.controller.transcript().len(),
                });
                self.emit(SessionEvent::ResearchStatusChanged {
                    status: ResearchStatus::Idle,
                });
                self.emit(SessionEvent::ProgressUpdated { progress: None });
                self.emit(SessionEvent::Error { message: e.to_string() });
                if let Some(reply) = self.send_reply.take() {
                    let _ = reply.send(Err(e.into()));
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: ResponseOutcome) {
        if let Some(plan) = outcome.document {
            self.cache_plan(&plan);
            if outcome.promoted {
                self.record_session(&plan);
                self.emit(SessionEvent::BindingChanged {
                    binding: self.controller.binding().clone(),
                    generation: self.controller.generation(),
                });
            }
            self.artifacts.receive_document(plan);
            self.emit_document();
        }
        self.attachments.merge_known(outcome.files);
        self.emit(SessionEvent::TranscriptChanged {
            len: self.controller.transcript().len(),
        });
        if outcome.status_changed {
            self.emit(SessionEvent::ResearchStatusChanged {
                status: self.controller.status(),
            });
        }
        if outcome.progress_changed {
            self.emit(SessionEvent::ProgressUpdated {
                progress: self.controller.progress().cloned(),
            });
        }
        if let Some(tasks) = outcome.proposed {
            self.emit(SessionEvent::PlanProposed { tasks });
        }
        if let Some(ticket) = outcome.continuation {
            self.schedule_continuation(ticket);
        } else if outcome.document_changed {
            self.emit_document();
        }
    }

    fn schedule_continuation(&self, ticket: ContinuationTicket) {
        let delay = self.config.continuation_delay();
        debug!(?ticket, delay_ms = self.config.continuation_delay_ms, "schedule_continuation: called");
        self.emit(SessionEvent::ContinuationScheduled {
            delay_ms: self.config.continuation_delay_ms,
        });
        self.spawn_completion(async move {
            tokio::time::sleep(delay).await;
            SessionCommand::Continue { ticket }
        });
    }

    fn handle_commit_completed(
        &mut self,
        generation: u64,
        result: Result<AccountPlan, BackendError>,
        reply: oneshot::Sender<SessionResponse<AccountPlan>>,
    ) {
        debug!(generation, ok = result.is_ok(), "handle_commit_completed: called");
        if generation != self.controller.generation() {
            // The user's edit still reached the service; keep the local cache in step
            if let Ok(saved) = &result {
                self.cache_plan(saved);
            }
            let _ = reply.send(Err(SessionError::Stale));
            return;
        }
        let result = self
            .artifacts
            .finish_commit(result)
            .cloned()
            .map_err(SessionError::from);
        if let Ok(live) = &result {
            self.cache_plan(live);
            self.record_session(live);
        } else {
            self.emit(SessionEvent::Error {
                message: "Saving the plan failed; local edits are kept but not synced".to_string(),
            });
        }
        self.emit_document();
        let _ = reply.send(result);
    }
}

async fn upload(backend: Arc<dyn ResearchBackend>, path: PathBuf) -> SessionResponse<AttachedFile> {
    let bytes = tokio::fs::read(&path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(backend.upload_file(&filename, bytes).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::{HistoryResponse, WireMessage};
    use crate::domain::{PlanSection, Role};
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::time::timeout;

    fn config() -> ResearchConfig {
        ResearchConfig {
            continuation_delay_ms: 5,
            continuation_message: "continue".to_string(),
        }
    }

    fn spawn(backend: Arc<MockBackend>, store: Arc<MemoryStore>) -> SessionHandle {
        let user = UserContext::new("u1", None, None).unwrap();
        SessionRuntime::spawn(user, backend, Repositories::shared(store), config())
    }

    fn plan(id: &str) -> AccountPlan {
        let mut plan = AccountPlan::new(id, "u1", "Nike");
        plan.sections = vec![PlanSection::new("Overview", SectionContent::text("Sportswear"))];
        plan
    }

    #[tokio::test]
    async fn test_spawn_seeds_new_plan_welcome() {
        let handle = spawn(Arc::new(MockBackend::default()), Arc::new(MemoryStore::new()));
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.transcript.len(), 1);
        assert!(snap.binding.conversation_id().is_some());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_promotes_and_caches_plan() {
        let backend = Arc::new(MockBackend::new(vec![ChatResponse {
            messages: vec![
                WireMessage::new(Role::User, "Plan for Nike"),
                WireMessage::new(Role::Assistant, "Draft created"),
            ],
            plan: Some(plan("p-1")),
            ..Default::default()
        }]));
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(backend.clone(), store.clone());

        let status = handle.send_message("Plan for Nike").await.unwrap();
        assert_eq!(status, ResearchStatus::Idle);

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.binding, SessionBinding::Plan("p-1".into()));
        assert_eq!(store.get_plan("u1", "p-1").unwrap().company, "Nike");
        assert_eq!(store.list_sessions("u1").unwrap().len(), 1);
        assert_eq!(handle.displayed_plan().await.unwrap().unwrap().id, "p-1");
        assert!(backend.requests()[0].conversation_id.is_some());
    }

    #[tokio::test]
    async fn test_open_plan_loads_cache_and_history() {
        let backend = Arc::new(MockBackend::default());
        backend.set_history(
            "p-1",
            HistoryResponse {
                messages: vec![WireMessage::new(Role::Assistant, "Earlier answer")],
                attached_files: vec![AttachedFile::new("f1", "q3.pdf")],
            },
        );
        let store = Arc::new(MemoryStore::new());
        store.upsert_plan(&plan("p-1")).unwrap();
        let handle = spawn(backend, store);

        handle.open_plan("p-1").await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.transcript.len(), 1);
        assert_eq!(snap.transcript[0].content, "Earlier answer");
        assert_eq!(handle.files().await.unwrap().known.len(), 1);
        assert_eq!(handle.versions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_without_rollback() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_updates(true);
        let store = Arc::new(MemoryStore::new());
        store.upsert_plan(&plan("p-1")).unwrap();
        let handle = spawn(backend.clone(), store);
        handle.open_plan("p-1").await.unwrap();

        handle.start_edit().await.unwrap();
        handle
            .edit_section(0, SectionContent::text("Edited overview"))
            .await
            .unwrap();
        let err = handle.commit_edit().await.unwrap_err();
        assert!(matches!(err, SessionError::Artifact(_)));

        let shown = handle.displayed_plan().await.unwrap().unwrap();
        assert_eq!(shown.sections[0].content, SectionContent::text("Edited overview"));
        assert!(handle.edit_buffer().await.unwrap().is_none());
        assert_eq!(backend.update_count(), 1);
    }

    #[tokio::test]
    async fn test_continuations_run_until_done() {
        let researching = |reply: &str| ChatResponse {
            messages: vec![
                WireMessage::new(Role::User, "research"),
                WireMessage::new(Role::Assistant, reply),
            ],
            research_status: ResearchStatus::Researching,
            ..Default::default()
        };
        let backend = Arc::new(MockBackend::new(vec![
            researching("step 1"),
            researching("step 2"),
            ChatResponse {
                messages: vec![
                    WireMessage::new(Role::User, "research"),
                    WireMessage::new(Role::Assistant, "final"),
                ],
                research_status: ResearchStatus::Done,
                ..Default::default()
            },
        ]));
        let handle = spawn(backend.clone(), Arc::new(MemoryStore::new()));
        let mut events = handle.subscribe();

        assert_eq!(handle.send_message("research").await.unwrap(), ResearchStatus::Researching);
        timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(SessionEvent::ResearchStatusChanged {
                    status: ResearchStatus::Done,
                }) = events.recv().await
                {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let messages: Vec<String> = backend.requests().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["research", "continue", "continue"]);
        let snap = handle.snapshot().await.unwrap();
        assert!(snap.transcript.iter().all(|m| m.content != "continue"));
        assert_eq!(snap.transcript.last().unwrap().content, "final");
    }
}
