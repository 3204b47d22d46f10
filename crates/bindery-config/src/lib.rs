//! Bindery Config
//!
//! Settings for the evaluation engine, loaded from a JSON file. Every field
//! has a default, so an empty object (or no file at all) is a valid config.

mod error;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
  pub log: LogConfig,
  pub sandbox: SandboxConfig,
  pub host: HostConfig,
}

/// Log capture pipeline settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
  /// Debounce window before buffered logs are flushed.
  pub flush_delay_ms: u64,
}

impl LogConfig {
  pub fn flush_delay(&self) -> Duration {
    Duration::from_millis(self.flush_delay_ms)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxConfig {
  /// Deepest function call nesting before a `RangeError` is thrown.
  pub max_call_depth: usize,
  /// Name of the isolate thread.
  pub thread_name: String,
  pub stack_size_bytes: usize,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    Self {
      max_call_depth: 256,
      thread_name: "bindery-isolate".to_string(),
      stack_size_bytes: 32 * 1024 * 1024,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
  /// How long the host waits for a run outcome. Unbounded when absent.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub eval_timeout_ms: Option<u64>,
}

impl HostConfig {
  pub fn eval_timeout(&self) -> Option<Duration> {
    self.eval_timeout_ms.map(Duration::from_millis)
  }
}

impl Config {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(json).map_err(|source| ConfigError::Parse {
      path: None,
      source,
    })
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: Some(path.to_path_buf()),
      source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  /// Load `path` if it exists, otherwise fall back to defaults.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_from_empty_object() {
    let config = Config::from_json("{}").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.sandbox.max_call_depth, 256);
    assert_eq!(config.sandbox.thread_name, "bindery-isolate");
    assert_eq!(config.log.flush_delay(), Duration::ZERO);
    assert_eq!(config.host.eval_timeout(), None);
  }

  #[test]
  fn test_partial_override() {
    let config =
      Config::from_json(r#"{"log": {"flushDelayMs": 25}, "host": {"evalTimeoutMs": 1000}}"#).unwrap();
    assert_eq!(config.log.flush_delay(), Duration::from_millis(25));
    assert_eq!(config.host.eval_timeout(), Some(Duration::from_secs(1)));
    assert_eq!(config.sandbox, SandboxConfig::default());
  }

  #[test]
  fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"sandbox": {{"maxCallDepth": 32}}}}"#).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.sandbox.max_call_depth, 32);
  }

  #[test]
  fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    assert!(matches!(Config::load(&path), Err(ConfigError::Read { .. })));
    assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
  }

  #[test]
  fn test_invalid_json() {
    let err = Config::from_json("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { path: None, .. }));
  }
}
