//! Bindery Host
//!
//! The host context: it starts the isolate, performs the trigger calls the
//! isolate requests and receives its log batches.
//!
//! ```ignore
//! let host = Host::start(&config, Arc::new(actions), Arc::new(NoopLogSink))?;
//! let result = host.evaluate(EvalRequest::new(run_id, binding, snapshot)).await?;
//! ```

mod error;
mod host;
mod local;
mod runner;
mod sink;

pub use error::HostError;
pub use host::{Host, SUPERSEDED};
pub use local::{Alert, Fixture, LocalActions, TimerTick};
pub use runner::{ActionRunner, TriggerContext};
pub use sink::{ChannelLogSink, LogSink, NoopLogSink};
