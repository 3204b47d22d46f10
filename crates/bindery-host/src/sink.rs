//! Destinations for log batches shipped out of the isolate.

use bindery_host_log::LogBatch;
use tokio::sync::mpsc;

/// Receives every batch the isolate flushes.
///
/// Called from the host's message pump; implementations must not block.
pub trait LogSink: Send + Sync {
  fn process(&self, batch: LogBatch);
}

/// A sink that discards all batches.
#[derive(Debug, Clone, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
  fn process(&self, _batch: LogBatch) {}
}

/// A sink that forwards batches to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
  sender: mpsc::UnboundedSender<LogBatch>,
}

impl ChannelLogSink {
  pub fn new(sender: mpsc::UnboundedSender<LogBatch>) -> Self {
    Self { sender }
  }
}

impl LogSink for ChannelLogSink {
  fn process(&self, batch: LogBatch) {
    // receiver may have been dropped
    let _ = self.sender.send(batch);
  }
}
