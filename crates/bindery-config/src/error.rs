use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config{}: {source}", path.as_ref().map(|p| format!(" file '{}'", p.display())).unwrap_or_default())]
  Parse {
    path: Option<PathBuf>,
    #[source]
    source: serde_json::Error,
  },
}
