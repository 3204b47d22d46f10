//! Bindery Sandbox
//!
//! The isolated evaluation context. Bindings are parsed and run by a
//! tree-walking interpreter over `Rc`-based values that never leave the
//! isolate thread. Side effects are not performed here: trigger functions
//! send a request to the host and hand back a promise that settles with the
//! host's response.
//!
//! ```ignore
//! let (host_port, isolate_port) = duplex::<HostAction, WorkerAction>();
//! let handle = Isolate::spawn(&config, isolate_port)?;
//! host_port.outbox().send(&Envelope::request(HostAction::EvalBinding(request)))?;
//! ```

mod builtins;
mod error;
mod interpreter;
mod promise;
mod protocol;
mod realm;
mod sandbox;
mod sanitize;
mod scope;
mod triggers;
mod value;
mod worker;

pub use error::{ErrorKind, SandboxError, Throw};
pub use interpreter::{EvalResult, Interpreter};
pub use promise::{Promise, PromiseState};
pub use protocol::{EvalOutcome, EvalRequest, HostAction, RunKind, RunResult, WorkerAction};
pub use sandbox::Sandbox;
pub use sanitize::{CIRCULAR, MAX_DEPTH, PROMISE, TOO_DEEP, sanitize, snapshot};
pub use scope::Scope;
pub use triggers::ACTION_ENTITY_TYPE;
pub use value::{Array, Function, Object, PropertyMap, Value};
pub use worker::{Isolate, IsolateHandle};
