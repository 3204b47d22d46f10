//! Destinations for flushed log batches.

use tokio::sync::mpsc;

use crate::LogBatch;

/// Receives every batch the pipeline flushes.
pub trait FlushSink {
  fn send(&self, batch: LogBatch);
}

/// Discards batches.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl FlushSink for NoopSink {
  fn send(&self, _batch: LogBatch) {}
}

/// Forwards batches to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  sender: mpsc::UnboundedSender<LogBatch>,
}

impl ChannelSink {
  pub fn new(sender: mpsc::UnboundedSender<LogBatch>) -> Self {
    Self { sender }
  }
}

impl FlushSink for ChannelSink {
  fn send(&self, batch: LogBatch) {
    // receiver may have been dropped
    let _ = self.sender.send(batch);
  }
}
