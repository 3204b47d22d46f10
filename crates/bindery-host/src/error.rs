use bindery_channel::ChannelError;
use bindery_sandbox::SandboxError;
use thiserror::Error;

/// Errors raised by the host side of the engine.
#[derive(Debug, Error)]
pub enum HostError {
  /// The isolate thread could not be started.
  #[error("failed to start isolate: {0}")]
  Isolate(#[from] SandboxError),

  /// A message could not be handed to the isolate.
  #[error("channel error: {0}")]
  Channel(#[from] ChannelError),

  /// No outcome arrived within the configured evaluation timeout.
  #[error("run '{run_id}' timed out")]
  Timeout { run_id: String },

  /// The isolate is gone or the host has been shut down.
  #[error("isolate disconnected")]
  Disconnected,
}
