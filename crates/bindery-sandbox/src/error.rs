//! Error types for the sandbox.

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Errors raised while starting or driving the isolate.
#[derive(Debug, Error)]
pub enum SandboxError {
  /// The isolate thread could not be spawned.
  #[error("failed to spawn isolate thread: {source}")]
  Spawn {
    #[source]
    source: std::io::Error,
  },

  /// The isolate's runtime could not be built.
  #[error("failed to build isolate runtime: {source}")]
  Runtime {
    #[source]
    source: std::io::Error,
  },
}

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Error,
  TypeError,
  ReferenceError,
  RangeError,
  SyntaxError,
}

impl ErrorKind {
  pub const ALL: [ErrorKind; 5] = [
    ErrorKind::Error,
    ErrorKind::TypeError,
    ErrorKind::ReferenceError,
    ErrorKind::RangeError,
    ErrorKind::SyntaxError,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ErrorKind::Error => "Error",
      ErrorKind::TypeError => "TypeError",
      ErrorKind::ReferenceError => "ReferenceError",
      ErrorKind::RangeError => "RangeError",
      ErrorKind::SyntaxError => "SyntaxError",
    }
  }
}

/// A value thrown by user code, or by the runtime on its behalf.
#[derive(Clone)]
pub struct Throw(pub Value);

impl Throw {
  pub fn value(&self) -> &Value {
    &self.0
  }

  pub fn into_value(self) -> Value {
    self.0
  }
}

impl fmt::Debug for Throw {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Throw({})", self.0.summary())
  }
}
