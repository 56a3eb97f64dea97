//! SessionController - transcript and research-progress state machine
//!
//! The controller is synchronous: it decides what to send and folds
//! completions back into state, but never performs I/O itself. Every request
//! it hands out is tagged with the binding generation it was issued for;
//! completions carrying an older generation are ignored.
//!
//! Research status moves `idle → researching → {done, idle}` and only on
//! what the service reports. While the service reports `researching`, the
//! caller is told to schedule a hidden continuation carrying the configured
//! sentinel message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::reconcile::reconcile;
use super::welcome::welcome_message;
use super::{SessionError, SessionResponse};
use crate::auth::UserContext;
use crate::backend::{BackendError, ChatRequest, ChatResponse, HistoryResponse};
use crate::domain::{
    AccountPlan, AttachedFile, ChatMessage, ResearchProgress, ResearchStatus, ResearchTask, Role, SessionBinding,
};
use crate::mention::AttachmentResolver;

/// A request ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub generation: u64,
    pub request: ChatRequest,
    pub hidden: bool,
}

/// Identifies the send cycle a continuation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationTicket {
    pub generation: u64,
    pub cycle: u64,
}

/// What the caller must do after a response was applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseOutcome {
    /// Document to hand to the artifact store
    pub document: Option<AccountPlan>,
    /// True if the binding was promoted to the document's plan id
    pub promoted: bool,
    /// Files the service reports for this session
    pub files: Vec<AttachedFile>,
    /// Newly proposed task list
    pub proposed: Option<Vec<ResearchTask>>,
    pub status_changed: bool,
    pub progress_changed: bool,
    /// Schedule a hidden continuation
    pub continuation: Option<ContinuationTicket>,
    /// Research stopped; dependent views should refresh
    pub document_changed: bool,
}

/// Read-only view of the controller state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub binding: SessionBinding,
    pub generation: u64,
    pub transcript: Vec<ChatMessage>,
    pub status: ResearchStatus,
    pub progress: Option<ResearchProgress>,
    pub proposed_plan: Option<Vec<ResearchTask>>,
    pub active_plan: Option<Vec<ResearchTask>>,
    pub in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct SessionController {
    user: UserContext,
    sentinel: String,
    binding: SessionBinding,
    generation: u64,
    cycle: u64,
    transcript: Vec<ChatMessage>,
    status: ResearchStatus,
    progress: Option<ResearchProgress>,
    proposed_plan: Option<Vec<ResearchTask>>,
    active_plan: Option<Vec<ResearchTask>>,
    research_started: Option<DateTime<Utc>>,
    in_flight: bool,
    /// A history fetch for this generation has not landed yet and no chat
    /// response has superseded it
    history_pending: bool,
}

impl SessionController {
    pub fn new(user: UserContext, sentinel: impl Into<String>) -> Self {
        let sentinel = sentinel.into();
        debug!(user_id = %user.user_id, %sentinel, "SessionController::new: called");
        Self {
            user,
            sentinel,
            binding: SessionBinding::Unbound,
            generation: 0,
            cycle: 0,
            transcript: Vec::new(),
            status: ResearchStatus::Idle,
            progress: None,
            proposed_plan: None,
            active_plan: None,
            research_started: None,
            in_flight: false,
            history_pending: false,
        }
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn status(&self) -> ResearchStatus {
        self.status
    }

    pub fn progress(&self) -> Option<&ResearchProgress> {
        self.progress.as_ref()
    }

    pub fn proposed_plan(&self) -> Option<&[ResearchTask]> {
        self.proposed_plan.as_deref()
    }

    pub fn active_plan(&self) -> Option<&[ResearchTask]> {
        self.active_plan.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            binding: self.binding.clone(),
            generation: self.generation,
            transcript: self.transcript.clone(),
            status: self.status,
            progress: self.progress.clone(),
            proposed_plan: self.proposed_plan.clone(),
            active_plan: self.active_plan.clone(),
            in_flight: self.in_flight,
        }
    }

    /// Switch to a new binding, discarding all session state
    ///
    /// Returns the new generation. Anything issued under an older generation
    /// becomes a no-op when it completes.
    pub fn rebind(&mut self, binding: SessionBinding) -> u64 {
        self.generation += 1;
        self.cycle = 0;
        info!(%binding, generation = self.generation, "rebind: session reset");
        self.binding = binding;
        self.transcript.clear();
        self.status = ResearchStatus::Idle;
        self.progress = None;
        self.proposed_plan = None;
        self.active_plan = None;
        self.research_started = None;
        self.in_flight = false;
        self.history_pending = true;
        self.generation
    }

    /// Start a brand-new plan: fresh ephemeral id plus the new-plan welcome
    pub fn start_new(&mut self, now: DateTime<Utc>) -> u64 {
        let generation = self.rebind(SessionBinding::ephemeral());
        self.history_pending = false;
        self.transcript.push(welcome_message(false, now));
        generation
    }

    /// Begin a send cycle
    ///
    /// Visible sends append the user's message optimistically, consume the
    /// pending attachments, clear stale progress and promote any proposed
    /// task list. Hidden sends (continuations) touch none of that.
    pub fn prepare_send(
        &mut self,
        text: &str,
        hidden: bool,
        attachments: &mut AttachmentResolver,
        now: DateTime<Utc>,
    ) -> SessionResponse<Outgoing> {
        debug!(hidden, len = text.len(), "prepare_send: called");
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.user.user_id.trim().is_empty() {
            return Err(SessionError::NoUser);
        }
        if self.in_flight {
            return Err(SessionError::Busy);
        }

        let mut file_ids = Vec::new();
        if !hidden {
            self.transcript.push(ChatMessage::user(text, now));
            file_ids = attachments.take_pending().into_iter().map(|f| f.id).collect();
            self.progress = None;
            self.research_started = Some(now);
            if let Some(tasks) = self.proposed_plan.take() {
                debug!(tasks = tasks.len(), "prepare_send: proposal accepted");
                self.active_plan = Some(tasks);
            }
        }

        if !self.binding.is_bound() {
            self.binding = SessionBinding::ephemeral();
            debug!(binding = %self.binding, "prepare_send: minted conversation id");
        }

        let plan_id = self.binding.plan_id().map(str::to_string);
        let conversation_id = match plan_id {
            Some(_) => None,
            None => self.binding.conversation_id().map(str::to_string),
        };

        self.cycle += 1;
        self.in_flight = true;
        Ok(Outgoing {
            generation: self.generation,
            request: ChatRequest {
                user_id: self.user.user_id.clone(),
                plan_id,
                message: text.to_string(),
                conversation_id,
                file_ids,
            },
            hidden,
        })
    }

    /// Hidden continuation for a ticket, if it is still current
    pub fn continuation(
        &mut self,
        ticket: ContinuationTicket,
        attachments: &mut AttachmentResolver,
        now: DateTime<Utc>,
    ) -> Option<Outgoing> {
        if ticket.generation != self.generation || ticket.cycle != self.cycle {
            debug!(?ticket, generation = self.generation, cycle = self.cycle, "continuation: stale ticket");
            return None;
        }
        if self.status != ResearchStatus::Researching || self.in_flight {
            debug!(status = %self.status, in_flight = self.in_flight, "continuation: not researching");
            return None;
        }
        let sentinel = self.sentinel.clone();
        self.prepare_send(&sentinel, true, attachments, now).ok()
    }

    /// Fold a successful chat response into the session
    ///
    /// Returns None for a stale generation.
    pub fn apply_response(
        &mut self,
        generation: u64,
        response: ChatResponse,
        now: DateTime<Utc>,
    ) -> Option<ResponseOutcome> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "apply_response: stale");
            return None;
        }
        debug!(status = %response.research_status, messages = response.messages.len(), "apply_response: called");
        self.in_flight = false;
        self.history_pending = false;
        let mut outcome = ResponseOutcome::default();

        self.transcript = reconcile(&self.transcript, response.messages, &self.sentinel, now);

        if let Some(plan) = response.plan {
            if self.binding.plan_id().is_none() {
                info!(plan_id = %plan.id, from = %self.binding, "apply_response: promoting to plan binding");
                self.binding = SessionBinding::Plan(plan.id.clone());
                outcome.promoted = true;
            }
            outcome.document = Some(plan);
        }

        let previous = self.status;
        self.status = response.research_status;
        outcome.status_changed = previous != self.status;
        if let Some(progress) = response.progress {
            self.progress = Some(progress);
            outcome.progress_changed = true;
        }

        if previous == ResearchStatus::Researching && self.status.is_terminal() {
            self.finish_run(now);
            outcome.progress_changed = true;
        }

        if let Some(tasks) = response.research_plan {
            self.proposed_plan = Some(tasks.clone());
            outcome.proposed = Some(tasks);
        }

        outcome.files = response.attached_files.unwrap_or_default();

        if self.status == ResearchStatus::Researching {
            outcome.continuation = Some(ContinuationTicket {
                generation: self.generation,
                cycle: self.cycle,
            });
        } else {
            outcome.document_changed = true;
        }
        Some(outcome)
    }

    /// Attach the elapsed run time to the latest assistant message's progress
    fn finish_run(&mut self, now: DateTime<Utc>) {
        let Some(started) = self.research_started.take() else {
            return;
        };
        let seconds = (now - started).num_seconds().max(0) as u64;
        info!(seconds, "finish_run: research concluded");

        if let Some(progress) = self.progress.as_mut() {
            progress.duration = Some(seconds);
        }
        let fallback = self.progress.clone();
        if let Some(message) = self.transcript.iter_mut().rev().find(|m| m.role == Role::Assistant) {
            match message.research_progress.as_mut() {
                Some(progress) => progress.duration = Some(seconds),
                None => message.research_progress = fallback,
            }
        }
    }

    /// Fold a dispatch failure into the session
    ///
    /// Research stops, progress is discarded and a visible error message is
    /// appended. The optimistic user message stays. Returns false when stale.
    pub fn apply_failure(&mut self, generation: u64, error: &BackendError, now: DateTime<Utc>) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, "apply_failure: stale");
            return false;
        }
        warn!(error = %error, "apply_failure: send failed");
        self.in_flight = false;
        self.status = ResearchStatus::Idle;
        self.progress = None;
        self.research_started = None;
        self.transcript.push(ChatMessage::assistant(
            format!("Sorry, I couldn't reach the research service: {}", error),
            now,
        ));
        true
    }

    /// Load fetched history; empty or failed fetches seed the welcome message
    ///
    /// A chat response applied under the same generation is newer than the
    /// history, so the transcript is then left alone and only the files are
    /// returned. Returns the session's known files, or None when stale.
    pub fn apply_history(
        &mut self,
        generation: u64,
        history: Result<HistoryResponse, BackendError>,
        now: DateTime<Utc>,
    ) -> Option<Vec<AttachedFile>> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "apply_history: stale");
            return None;
        }
        let history = history.unwrap_or_else(|e| {
            warn!(error = %e, "apply_history: fetch failed, treating as empty");
            HistoryResponse::default()
        });
        if !std::mem::replace(&mut self.history_pending, false) {
            debug!(binding = %self.binding, "apply_history: superseded by a chat response");
            return Some(history.attached_files);
        }
        self.transcript = reconcile(&self.transcript, history.messages, &self.sentinel, now);
        if self.transcript.is_empty() {
            debug!(binding = %self.binding, "apply_history: seeding welcome");
            self.transcript.push(welcome_message(self.binding.plan_id().is_some(), now));
        }
        Some(history.attached_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WireMessage;
    use crate::session::welcome::{EXISTING_PLAN_WELCOME_ID, NEW_PLAN_WELCOME_ID};
    use chrono::Duration;

    fn controller() -> SessionController {
        let user = UserContext::new("u1", None, None).unwrap();
        SessionController::new(user, "continue")
    }

    fn progress(step: u32) -> ResearchProgress {
        ResearchProgress {
            current_step: step,
            total_steps: 3,
            label: format!("Step {}/3", step),
            tasks: vec![],
            duration: None,
        }
    }

    fn response(status: ResearchStatus, messages: Vec<WireMessage>) -> ChatResponse {
        ChatResponse {
            messages,
            research_status: status,
            ..Default::default()
        }
    }

    fn turn(user: &str, reply: &str) -> Vec<WireMessage> {
        vec![WireMessage::new(Role::User, user), WireMessage::new(Role::Assistant, reply)]
    }

    #[test]
    fn test_prepare_send_mints_conversation_and_captures_files() {
        let mut ctl = controller();
        let mut files = AttachmentResolver::new();
        files.attach(AttachedFile::new("f1", "q3.pdf"));
        let now = Utc::now();

        let out = ctl.prepare_send("research Nike", false, &mut files, now).unwrap();
        assert!(!out.hidden);
        assert_eq!(out.request.user_id, "u1");
        assert!(out.request.plan_id.is_none());
        assert!(out.request.conversation_id.as_deref().unwrap().starts_with("new-"));
        assert_eq!(out.request.file_ids, vec!["f1".to_string()]);
        assert!(files.pending().is_empty());
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].role, Role::User);
        assert!(ctl.is_in_flight());
        assert!(matches!(
            ctl.prepare_send("again", false, &mut files, now),
            Err(SessionError::Busy)
        ));
    }

    #[test]
    fn test_prepare_send_rejects_empty() {
        let mut ctl = controller();
        let mut files = AttachmentResolver::new();
        assert!(matches!(
            ctl.prepare_send("   ", false, &mut files, Utc::now()),
            Err(SessionError::EmptyMessage)
        ));
        assert!(ctl.transcript().is_empty());
    }

    #[test]
    fn test_plan_binding_omits_conversation_id() {
        let mut ctl = controller();
        ctl.rebind(SessionBinding::Plan("p1".into()));
        let out = ctl
            .prepare_send("hi", false, &mut AttachmentResolver::new(), Utc::now())
            .unwrap();
        assert_eq!(out.request.plan_id.as_deref(), Some("p1"));
        assert!(out.request.conversation_id.is_none());
    }

    #[test]
    fn test_response_promotes_binding_and_forwards_document() {
        let mut ctl = controller();
        let now = Utc::now();
        let out = ctl
            .prepare_send("research Nike", false, &mut AttachmentResolver::new(), now)
            .unwrap();
        let generation_before = ctl.generation();

        let mut resp = response(ResearchStatus::Idle, turn("research Nike", "Here is a plan"));
        resp.plan = Some(AccountPlan::new("p-9", "u1", "Nike"));
        let outcome = ctl.apply_response(out.generation, resp, now).unwrap();

        assert!(outcome.promoted);
        assert_eq!(outcome.document.unwrap().id, "p-9");
        assert_eq!(ctl.binding(), &SessionBinding::Plan("p-9".into()));
        assert_eq!(ctl.generation(), generation_before);
        assert!(outcome.document_changed);
        assert!(outcome.continuation.is_none());
        assert_eq!(ctl.transcript().len(), 2);
        assert!(!ctl.is_in_flight());
    }

    #[test]
    fn test_researching_schedules_continuation_until_done() {
        let mut ctl = controller();
        let mut files = AttachmentResolver::new();
        let t0 = Utc::now();
        let out = ctl.prepare_send("research Nike", false, &mut files, t0).unwrap();

        let mut resp = response(ResearchStatus::Researching, turn("research Nike", "Step 1 findings"));
        resp.progress = Some(progress(1));
        let outcome = ctl.apply_response(out.generation, resp, t0).unwrap();
        let ticket = outcome.continuation.unwrap();
        assert_eq!(ctl.status(), ResearchStatus::Researching);

        let cont = ctl.continuation(ticket, &mut files, t0).unwrap();
        assert!(cont.hidden);
        assert_eq!(cont.request.message, "continue");
        // Hidden continuations never reach the visible transcript
        assert_eq!(ctl.transcript().len(), 2);

        let mut messages = turn("research Nike", "Step 1 findings");
        messages.push(WireMessage::new(Role::User, "continue"));
        messages.push(WireMessage::new(Role::Assistant, "Final report"));
        let mut done = response(ResearchStatus::Done, messages);
        done.progress = Some(progress(3));
        let t1 = t0 + Duration::seconds(42);
        let outcome = ctl.apply_response(cont.generation, done, t1).unwrap();

        assert!(outcome.continuation.is_none());
        assert!(outcome.document_changed);
        assert_eq!(ctl.status(), ResearchStatus::Done);
        let contents: Vec<&str> = ctl.transcript().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["research Nike", "Step 1 findings", "Final report"]);
        let last = ctl.transcript().last().unwrap();
        assert_eq!(last.research_progress.as_ref().unwrap().duration, Some(42));
        assert_eq!(ctl.progress().unwrap().duration, Some(42));
    }

    #[test]
    fn test_continuation_ticket_goes_stale() {
        let mut ctl = controller();
        let mut files = AttachmentResolver::new();
        let now = Utc::now();
        let out = ctl.prepare_send("go", false, &mut files, now).unwrap();
        let outcome = ctl
            .apply_response(out.generation, response(ResearchStatus::Researching, turn("go", "working")), now)
            .unwrap();
        let ticket = outcome.continuation.unwrap();

        // A visible send supersedes the pending continuation
        let mut ahead = ctl.clone();
        ahead.prepare_send("stop", false, &mut files, now).unwrap();
        assert!(ahead.continuation(ticket, &mut files, now).is_none());

        // Rebinding makes it a no-op too
        ctl.rebind(SessionBinding::Plan("other".into()));
        assert!(ctl.continuation(ticket, &mut files, now).is_none());
    }

    #[test]
    fn test_stale_completions_are_dropped() {
        let mut ctl = controller();
        let now = Utc::now();
        let out = ctl
            .prepare_send("go", false, &mut AttachmentResolver::new(), now)
            .unwrap();
        ctl.rebind(SessionBinding::Plan("p2".into()));

        assert!(ctl.apply_response(out.generation, response(ResearchStatus::Done, turn("go", "x")), now).is_none());
        assert!(!ctl.apply_failure(out.generation, &BackendError::InvalidResponse("x".into()), now));
        assert!(ctl.transcript().is_empty());
    }

    #[test]
    fn test_failure_keeps_user_message_and_resets_research() {
        let mut ctl = controller();
        let now = Utc::now();
        let out = ctl
            .prepare_send("go", false, &mut AttachmentResolver::new(), now)
            .unwrap();
        let ticket = ctl
            .apply_response(out.generation, response(ResearchStatus::Researching, turn("go", "working")), now)
            .and_then(|outcome| outcome.continuation)
            .unwrap();
        let cont = ctl.continuation(ticket, &mut AttachmentResolver::new(), now).unwrap();

        assert!(ctl.apply_failure(cont.generation, &BackendError::InvalidResponse("boom".into()), now));
        assert_eq!(ctl.status(), ResearchStatus::Idle);
        assert!(ctl.progress().is_none());
        assert_eq!(ctl.transcript()[0].content, "go");
        let last = ctl.transcript().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.contains("boom"));
    }

    #[test]
    fn test_proposal_promoted_on_next_send() {
        let mut ctl = controller();
        let mut files = AttachmentResolver::new();
        let now = Utc::now();
        let out = ctl.prepare_send("plan it", false, &mut files, now).unwrap();
        let mut resp = response(ResearchStatus::Idle, turn("plan it", "Proposed steps"));
        resp.research_plan = Some(vec![ResearchTask::new("Financials"), ResearchTask::new("Leadership")]);
        let outcome = ctl.apply_response(out.generation, resp, now).unwrap();
        assert_eq!(outcome.proposed.unwrap().len(), 2);
        assert_eq!(ctl.proposed_plan().unwrap().len(), 2);

        ctl.prepare_send("yes, go", false, &mut files, now).unwrap();
        assert!(ctl.proposed_plan().is_none());
        assert_eq!(ctl.active_plan().unwrap()[0].task, "Financials");
    }

    #[test]
    fn test_history_seeds_welcome_variants() {
        let mut ctl = controller();
        let now = Utc::now();

        let generation = ctl.rebind(SessionBinding::Plan("p1".into()));
        ctl.apply_history(generation, Ok(HistoryResponse::default()), now).unwrap();
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].id, EXISTING_PLAN_WELCOME_ID);

        let generation = ctl.rebind(SessionBinding::Plan("p2".into()));
        ctl.apply_history(generation, Err(BackendError::InvalidResponse("down".into())), now)
            .unwrap();
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].id, EXISTING_PLAN_WELCOME_ID);

        ctl.start_new(now);
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].id, NEW_PLAN_WELCOME_ID);
        assert!(ctl.binding().conversation_id().is_some());
    }

    #[test]
    fn test_history_loads_transcript_and_files() {
        let mut ctl = controller();
        let generation = ctl.rebind(SessionBinding::Plan("p1".into()));
        let history = HistoryResponse {
            messages: turn("hello", "hi there"),
            attached_files: vec![AttachedFile::new("f1", "deck.pptx")],
        };
        let files = ctl.apply_history(generation, Ok(history), Utc::now()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(ctl.transcript().len(), 2);
        assert!(ctl.apply_history(generation - 1, Ok(HistoryResponse::default()), Utc::now()).is_none());
    }

    #[test]
    fn test_late_history_keeps_newer_transcript() {
        let mut ctl = controller();
        let now = Utc::now();
        let generation = ctl.rebind(SessionBinding::Plan("p1".into()));
        let out = ctl
            .prepare_send("again", false, &mut AttachmentResolver::new(), now)
            .unwrap();
        let mut messages = turn("hello", "old answer");
        messages.extend(turn("again", "new answer"));
        ctl.apply_response(out.generation, response(ResearchStatus::Idle, messages), now)
            .unwrap();

        let history = HistoryResponse {
            messages: turn("hello", "old answer"),
            attached_files: vec![AttachedFile::new("f1", "deck.pptx")],
        };
        let files = ctl.apply_history(generation, Ok(history), now).unwrap();
        assert_eq!(files.len(), 1);
        let contents: Vec<&str> = ctl.transcript().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "old answer", "again", "new answer"]);

        // An empty late history never swaps the reply for a welcome
        assert!(ctl.apply_history(generation, Ok(HistoryResponse::default()), now).is_some());
        assert_eq!(ctl.transcript().len(), 4);
    }
}
