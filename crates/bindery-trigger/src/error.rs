use thiserror::Error;

/// Errors raised by the trigger dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
  /// A response arrived for a correlation id that is not pending.
  #[error("no pending trigger call with correlation id '{correlation_id}'")]
  UnknownCorrelation { correlation_id: String },

  /// The channel to the host is gone; no new calls are accepted.
  #[error("trigger channel disconnected: {reason}")]
  Disconnected { reason: String },

  /// The request could not be handed to the transport.
  #[error("failed to send trigger request: {message}")]
  Transport { message: String },
}
