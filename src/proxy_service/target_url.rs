use std::borrow::Cow;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use thiserror::Error;
use url::form_urlencoded;

pub const TARGET_QUERY_PARAM: &str = "url";

static ABSOLUTE_URL: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)^https?://").expect("absolute url pattern"));

// Case sensitive on purpose, `HTTPS:///x` is left alone.
static EXTRA_SLASHES: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(https?):/+([^/])").expect("extra slashes pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
  #[error("malformed percent escape at byte {0}")]
  MalformedEscape(usize),
  #[error("decoded bytes are not valid UTF-8")]
  InvalidUtf8,
}

/// Resolves the target from a raw query string (everything after `?`).
///
/// A non-empty `url=<target>` wins; otherwise the whole query is the target,
/// which keeps `/?https://example.com/path` working. The result is either empty or starts
/// with `http://` / `https://`.
pub fn target_from_query(query: &str) -> String {
  let raw = form_urlencoded::parse(query.as_bytes())
    .find(|(key, _)| key == TARGET_QUERY_PARAM)
    .map(|(_, value)| value.into_owned())
    .filter(|value| !value.is_empty())
    .unwrap_or_else(|| query.to_owned());

  normalize(&raw)
}

pub fn normalize(raw: &str) -> String {
  let mut value = raw.trim().to_owned();

  if !looks_absolute(&value) {
    if let Some(decoded) = decode_until_absolute(&value) {
      value = decoded;
    }
  }

  let value = EXTRA_SLASHES.replace(&value, "${1}://${2}");

  if value.starts_with("//") {
    format!("https:{}", value)
  } else if !value.is_empty() && !ABSOLUTE_URL.is_match(&value) {
    format!("https://{}", value)
  } else {
    value.into_owned()
  }
}

fn looks_absolute(value: &str) -> bool {
  ABSOLUTE_URL.is_match(value) || value.starts_with("//")
}

/// At most two decode passes. Anything encoded deeper stays as it was.
fn decode_until_absolute(value: &str) -> Option<String> {
  let once = decode_component(value).ok()?;
  if looks_absolute(&once) {
    return Some(once);
  }

  let twice = decode_component(&once).ok()?;
  looks_absolute(&twice).then_some(twice)
}

/// Strict percent-decoding: a `%` must be followed by two hex digits and the
/// decoded bytes must be UTF-8.
pub fn decode_component(value: &str) -> Result<String, DecodeError> {
  let bytes = value.as_bytes();

  for (idx, _) in value.match_indices('%') {
    let escaped = bytes
      .get(idx + 1..idx + 3)
      .map_or(false, |pair| pair.iter().all(u8::is_ascii_hexdigit));

    if !escaped {
      return Err(DecodeError::MalformedEscape(idx));
    }
  }

  percent_decode_str(value)
    .decode_utf8()
    .map(Cow::into_owned)
    .map_err(|_| DecodeError::InvalidUtf8)
}
