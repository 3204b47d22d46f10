//! Log capture for evaluation runs.
//!
//! Console calls made by user code are buffered raw, then sanitized and
//! shipped to the host in batches once a debounce window passes without new
//! captures. Each batch carries the request info of the run that produced it.

mod capture;
mod entry;
mod error;
mod meta;
mod sink;

pub use capture::{Capturable, LogCapture};
pub use entry::{LogEntry, LogMethod, Severity};
pub use error::SanitizeError;
pub use meta::{EventType, LogBatch, RequestInfo, TriggerMeta, TriggerSource};
pub use sink::{ChannelSink, FlushSink, NoopSink};
