use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Targets that may never be fetched. Empty: nothing is blocked.
pub const DEFAULT_DENY_URLS: &[&str] = &[];
/// Origins allowed to use the proxy. `.*` lets every page in.
pub const DEFAULT_ALLOW_ORIGINS: &[&str] = &[".*"];

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct PolicyConfigFile {
  pub deny_urls: Vec<String>,
  pub allow_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unable to open policy file '{path}'")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid policy file")]
  Yaml(#[from] serde_yaml::Error),
  #[error("invalid pattern in '{list}'")]
  Pattern {
    list: &'static str,
    #[source]
    source: regex::Error,
  },
}

impl Default for PolicyConfigFile {
  fn default() -> Self {
    PolicyConfigFile {
      deny_urls: DEFAULT_DENY_URLS.iter().map(|p| p.to_string()).collect(),
      allow_origins: DEFAULT_ALLOW_ORIGINS.iter().map(|p| p.to_string()).collect(),
    }
  }
}

impl PolicyConfigFile {
  pub fn load_from_file(path: &Path) -> Result<PolicyConfigFile, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;

    Self::load_from_reader(file)
  }

  pub fn load_from_reader<R: std::io::Read>(reader: R) -> Result<PolicyConfigFile, ConfigError> {
    let policy: PolicyConfigFile = serde_yaml::from_reader(reader)?;

    Ok(policy)
  }
}
