//! Parse error type.

/// A lexing or parsing failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (at offset {offset})")]
pub struct ParseError {
  pub message: String,
  /// Byte offset into the source where the problem was detected.
  pub offset: usize,
}

impl ParseError {
  pub fn new(message: impl Into<String>, offset: usize) -> Self {
    Self {
      message: message.into(),
      offset,
    }
  }
}
