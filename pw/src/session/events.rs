//! Session events broadcast to observers

use serde::Serialize;

use crate::domain::{ResearchProgress, ResearchStatus, ResearchTask, SessionBinding};

/// Something observers may want to redraw for
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session was reset onto a new binding, or promoted to a plan id
    BindingChanged { binding: SessionBinding, generation: u64 },
    /// The visible transcript was replaced or appended to
    TranscriptChanged { len: usize },
    ResearchStatusChanged { status: ResearchStatus },
    ProgressUpdated { progress: Option<ResearchProgress> },
    PlanProposed { tasks: Vec<ResearchTask> },
    /// The live document, its history or the view pointer changed
    DocumentChanged { plan_id: Option<String>, version: Option<u32> },
    ContinuationScheduled { delay_ms: u64 },
    Error { message: String },
}
