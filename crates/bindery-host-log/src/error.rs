use thiserror::Error;

/// A captured value could not be turned into JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
  #[error("value nested deeper than {limit} levels")]
  TooDeep { limit: usize },

  #[error("{message}")]
  Unsupported { message: String },
}
