//! Session state synchronization
//!
//! [`SessionController`] is the synchronous state machine for one
//! conversation; [`SessionRuntime`] wraps it, the artifact store and the
//! attachment resolver in an actor that talks to the research service.

mod controller;
mod error;
mod events;
mod messages;
mod reconcile;
mod runtime;
mod welcome;

pub use controller::{ContinuationTicket, Outgoing, ResponseOutcome, SessionController, SessionSnapshot};
pub use error::{SessionError, SessionResponse};
pub use events::SessionEvent;
pub use messages::{SessionCommand, SessionFiles};
pub use reconcile::{reconcile, visible_messages};
pub use runtime::{Repositories, SessionHandle, SessionRuntime};
pub use welcome::{EXISTING_PLAN_WELCOME_ID, NEW_PLAN_WELCOME_ID, welcome_message};
