//! Bindery Channel
//!
//! A duplex, asynchronous, message-passing transport between the host context
//! and the isolated evaluation context. The two sides share no memory: every
//! envelope is serialized to a JSON frame on send and decoded on receipt, so
//! anything that crosses the boundary must be structurally serializable.
//!
//! ```ignore
//! let (host, isolate) = duplex::<HostAction, WorkerAction>();
//! host.outbox().send(&Envelope::request(HostAction::Ping))?;
//! ```

mod envelope;
mod error;
mod port;

pub use envelope::{Envelope, MessageType};
pub use error::ChannelError;
pub use port::{Inbox, Outbox, Port, duplex};
