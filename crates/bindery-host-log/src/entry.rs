use serde::{Deserialize, Serialize};

/// Console method that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMethod {
  Log,
  Info,
  Debug,
  Warn,
  Error,
  Table,
}

/// The three tiers every method collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Error,
}

/// Fixed method to severity table.
const SEVERITIES: &[(LogMethod, Severity)] = &[
  (LogMethod::Log, Severity::Info),
  (LogMethod::Info, Severity::Info),
  (LogMethod::Debug, Severity::Info),
  (LogMethod::Warn, Severity::Warning),
  (LogMethod::Error, Severity::Error),
  (LogMethod::Table, Severity::Info),
];

impl LogMethod {
  pub const ALL: [LogMethod; 6] = [
    LogMethod::Log,
    LogMethod::Info,
    LogMethod::Debug,
    LogMethod::Warn,
    LogMethod::Error,
    LogMethod::Table,
  ];

  pub fn severity(self) -> Severity {
    SEVERITIES
      .iter()
      .find(|(method, _)| *method == self)
      .map(|(_, severity)| *severity)
      .unwrap_or(Severity::Info)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      LogMethod::Log => "log",
      LogMethod::Info => "info",
      LogMethod::Debug => "debug",
      LogMethod::Warn => "warn",
      LogMethod::Error => "error",
      LogMethod::Table => "table",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|method| method.as_str() == name)
  }
}

/// One sanitized console call as delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
  pub method: LogMethod,
  pub id: String,
  pub data: Vec<serde_json::Value>,
  /// Local wall-clock time of the capture, `HH:MM:SS`.
  pub timestamp: String,
  pub severity: Severity,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_severity_table() {
    assert_eq!(LogMethod::Error.severity(), Severity::Error);
    assert_eq!(LogMethod::Warn.severity(), Severity::Warning);
    for method in [LogMethod::Log, LogMethod::Info, LogMethod::Debug, LogMethod::Table] {
      assert_eq!(method.severity(), Severity::Info);
    }
  }

  #[test]
  fn test_method_names() {
    for method in LogMethod::ALL {
      assert_eq!(LogMethod::from_name(method.as_str()), Some(method));
      assert_eq!(serde_json::to_value(method).unwrap(), method.as_str());
    }
    assert_eq!(LogMethod::from_name("trace"), None);
    assert_eq!(serde_json::to_value(Severity::Warning).unwrap(), "warning");
  }
}
