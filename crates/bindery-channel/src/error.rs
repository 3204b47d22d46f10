//! Channel error types.

/// Errors that can occur while moving envelopes across the channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
  /// The other side of the channel has been dropped.
  #[error("message channel closed")]
  Closed,

  /// The outgoing envelope could not be serialized.
  #[error("failed to encode message: {source}")]
  Encode {
    #[source]
    source: serde_json::Error,
  },

  /// An incoming frame did not match the expected envelope shape.
  #[error("failed to decode message: {source}")]
  Decode {
    #[source]
    source: serde_json::Error,
  },
}
