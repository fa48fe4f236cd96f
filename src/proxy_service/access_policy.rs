use regex::RegexSet;
use reqwest::header::HeaderValue;

use crate::policy_config::{ConfigError, PolicyConfigFile};

/// Compiled deny and allow lists. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct PolicyLists {
  deny_urls: RegexSet,
  allow_origins: RegexSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
  NoTarget,
  TargetDenied,
  OriginNotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Forward,
  Deny(DenyReason),
}

impl PolicyLists {
  pub fn compile(config: &PolicyConfigFile) -> Result<Self, ConfigError> {
    let deny_urls = RegexSet::new(&config.deny_urls)
      .map_err(|source| ConfigError::Pattern { list: "deny_urls", source })?;
    let allow_origins = RegexSet::new(&config.allow_origins)
      .map_err(|source| ConfigError::Pattern { list: "allow_origins", source })?;

    Ok(PolicyLists {
      deny_urls,
      allow_origins,
    })
  }

  pub fn deny_count(&self) -> usize {
    self.deny_urls.len()
  }

  pub fn allow_count(&self) -> usize {
    self.allow_origins.len()
  }

  /// An absent `Origin` is always allowed. A present one that is not valid
  /// text never matches.
  pub fn evaluate(&self, target: &str, origin: Option<&HeaderValue>) -> Verdict {
    if target.is_empty() {
      return Verdict::Deny(DenyReason::NoTarget);
    }

    if is_listed(Some(target), &self.deny_urls) {
      return Verdict::Deny(DenyReason::TargetDenied);
    }

    let origin_listed = match origin {
      None => is_listed(None, &self.allow_origins),
      Some(value) => value
        .to_str()
        .map_or(false, |origin| is_listed(Some(origin), &self.allow_origins)),
    };

    if origin_listed {
      Verdict::Forward
    } else {
      Verdict::Deny(DenyReason::OriginNotAllowed)
    }
  }
}

/// Unanchored search against every pattern; a missing candidate counts as listed.
pub fn is_listed(candidate: Option<&str>, patterns: &RegexSet) -> bool {
  match candidate {
    Some(value) => patterns.is_match(value),
    None => true,
  }
}
