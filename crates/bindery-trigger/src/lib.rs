//! Trigger calls: the side-effecting capabilities a binding may request, the
//! request/response types that carry them, and the dispatcher that matches
//! responses to waiting callers.

mod capability;
mod dispatcher;
mod error;
mod wire;

pub use capability::Capability;
pub use dispatcher::{PendingTrigger, TriggerDispatcher, TriggerTransport};
pub use error::TriggerError;
pub use wire::{TriggerCall, TriggerOutcome, TriggerRequest, TriggerResponse};
