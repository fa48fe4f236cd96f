use std::fmt::{Display, Formatter};

use actix_web::http::header::HeaderMap as InboundHeaders;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::proxy_service::is_transport_header;

/// Caller supplied JSON object with extra headers for the upstream request.
pub const CONTROL_HEADER: &str = "x-cors-headers";

const DROPPED_PREFIXES: [&str; 4] = ["origin", "cf-", "x-forw", CONTROL_HEADER];
const DROPPED_FRAGMENT: &str = "eferer";

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderOverrides(Map<String, Value>);

/// The control header as the caller sent it: usable overrides, or whatever
/// else arrived (kept for the info page, never applied).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlHeader {
  Overrides(HeaderOverrides),
  Ignored(Value),
}

impl ControlHeader {
  pub fn from_headers(headers: &InboundHeaders) -> Option<ControlHeader> {
    let raw = headers.get(CONTROL_HEADER)?;

    match raw.to_str() {
      Ok(text) => Some(Self::parse(text)),
      Err(_) => {
        warn!("Ignoring {} with non-text content.", CONTROL_HEADER);
        let lossy = String::from_utf8_lossy(raw.as_bytes()).into_owned();
        Some(ControlHeader::Ignored(Value::String(lossy)))
      }
    }
  }

  /// Unparsable text is kept as a JSON string.
  pub fn parse(raw: &str) -> ControlHeader {
    match serde_json::from_str::<Value>(raw) {
      Ok(Value::Object(entries)) => ControlHeader::Overrides(HeaderOverrides(entries)),
      Ok(other) => {
        warn!("Ignoring {}: not a JSON object.", CONTROL_HEADER);
        ControlHeader::Ignored(other)
      }
      Err(err) => {
        warn!("Ignoring {}: {}", CONTROL_HEADER, err);
        ControlHeader::Ignored(Value::String(raw.to_owned()))
      }
    }
  }

  pub fn into_overrides(self) -> Option<HeaderOverrides> {
    match self {
      ControlHeader::Overrides(overrides) => Some(overrides),
      ControlHeader::Ignored(_) => None,
    }
  }
}

impl Display for ControlHeader {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ControlHeader::Overrides(overrides) => Display::fmt(overrides, f),
      ControlHeader::Ignored(value) => write!(f, "{}", value),
    }
  }
}

impl HeaderOverrides {
  /// Reads the control header. Anything that is not a JSON object is ignored.
  pub fn from_headers(headers: &InboundHeaders) -> Option<HeaderOverrides> {
    ControlHeader::from_headers(headers).and_then(ControlHeader::into_overrides)
  }

  pub fn parse(raw: &str) -> Option<HeaderOverrides> {
    ControlHeader::parse(raw).into_overrides()
  }

  pub fn headers(&self) -> impl Iterator<Item = (HeaderName, HeaderValue)> + '_ {
    self.0.iter().filter_map(|(name, value)| {
      let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => {
          warn!("Skipping override '{}': unsupported value {}", name, value);
          return None;
        }
      };

      match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(text)) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => {
          warn!("Skipping override '{}': not a valid header.", name);
          None
        }
      }
    })
  }
}

impl Display for HeaderOverrides {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let json = serde_json::to_string(&self.0).map_err(|_| std::fmt::Error)?;
    f.write_str(&json)
  }
}

pub fn is_forwardable(name: &HeaderName) -> bool {
  let name = name.as_str();

  !DROPPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    && !name.contains(DROPPED_FRAGMENT)
}

/// Header set for the upstream request: inbound headers minus caller metadata
/// and proxy control headers, with the overrides laid on top.
pub fn sanitize(inbound: &InboundHeaders, overrides: Option<&HeaderOverrides>) -> HeaderMap {
  let mut outbound = HeaderMap::new();

  for (name, value) in inbound.iter() {
    if is_forwardable(name) && !is_transport_header(name) {
      outbound.append(name.clone(), value.clone());
    }
  }

  if let Some(overrides) = overrides {
    for (name, value) in overrides.headers() {
      outbound.insert(name, value);
    }
  }

  outbound
}

#[cfg(test)]
mod tests {
  use super::*;

  fn inbound(pairs: &[(&'static str, &'static str)]) -> InboundHeaders {
    let mut headers = InboundHeaders::new();
    for (name, value) in pairs {
      headers.append(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
  }

  #[test]
  fn drops_caller_metadata_and_control_headers() {
    let headers = inbound(&[
      ("origin", "https://app.test"),
      ("referer", "https://app.test/page"),
      ("x-referer-policy", "strict"),
      ("cf-connecting-ip", "203.0.113.7"),
      ("cf-ray", "8a1b-FRA"),
      ("x-forwarded-for", "203.0.113.7"),
      ("x-forwarded-proto", "https"),
      ("x-cors-headers", "{}"),
      ("accept", "application/json"),
      ("x-custom", "kept"),
    ]);

    let outbound = sanitize(&headers, None);

    assert_eq!(outbound.len(), 2);
    assert_eq!(outbound["accept"], "application/json");
    assert_eq!(outbound["x-custom"], "kept");
  }

  #[test]
  fn leaves_transport_headers_to_client() {
    let headers = inbound(&[
      ("host", "proxy.test"),
      ("connection", "keep-alive"),
      ("content-length", "12"),
      ("user-agent", "test"),
    ]);

    let outbound = sanitize(&headers, None);

    assert_eq!(outbound.len(), 1);
    assert!(outbound.contains_key("user-agent"));
  }

  #[test]
  fn keeps_every_value_of_repeated_header() {
    let headers = inbound(&[("accept-language", "en"), ("accept-language", "de")]);

    let outbound = sanitize(&headers, None);
    let values: Vec<_> = outbound.get_all("accept-language").iter().collect();

    assert_eq!(values, vec!["en", "de"]);
  }

  #[test]
  fn overrides_win_on_collision() {
    let headers = inbound(&[("authorization", "Bearer old"), ("accept", "*/*")]);
    let overrides = HeaderOverrides::parse(r#"{"Authorization": "Bearer new", "x-api-key": "k"}"#);

    let outbound = sanitize(&headers, overrides.as_ref());

    assert_eq!(outbound["authorization"], "Bearer new");
    assert_eq!(outbound["x-api-key"], "k");
    assert_eq!(outbound["accept"], "*/*");
  }

  #[test]
  fn scalar_override_values_are_stringified() {
    let overrides = HeaderOverrides::parse(r#"{"x-count": 3, "x-flag": true, "x-null": null, "x-list": [1]}"#).unwrap();

    let headers: Vec<_> = overrides.headers().collect();

    assert_eq!(headers.len(), 2);
    assert!(headers.contains(&(HeaderName::from_static("x-count"), HeaderValue::from_static("3"))));
    assert!(headers.contains(&(HeaderName::from_static("x-flag"), HeaderValue::from_static("true"))));
  }

  #[test]
  fn invalid_override_entries_are_skipped() {
    let overrides = HeaderOverrides::parse(r#"{"bad name": "v", "x-ok": "v", "x-bad-value": "a\nb"}"#).unwrap();

    let names: Vec<_> = overrides.headers().map(|(name, _)| name).collect();

    assert_eq!(names, vec![HeaderName::from_static("x-ok")]);
  }

  #[test]
  fn unparsable_control_header_is_absent() {
    assert_eq!(HeaderOverrides::parse("{not json"), None);
    assert_eq!(HeaderOverrides::parse("[\"a\"]"), None);
    assert_eq!(HeaderOverrides::parse("\"text\""), None);
  }

  #[test]
  fn reads_control_header_from_request() {
    let headers = inbound(&[("x-cors-headers", r#"{"x-a":"1"}"#)]);

    let overrides = HeaderOverrides::from_headers(&headers).unwrap();

    assert_eq!(overrides.to_string(), r#"{"x-a":"1"}"#);
    assert_eq!(HeaderOverrides::from_headers(&InboundHeaders::new()), None);
  }

  #[test]
  fn unparsable_control_header_is_kept_as_json_string() {
    let headers = inbound(&[("x-cors-headers", "{not json")]);

    let control = ControlHeader::from_headers(&headers).unwrap();

    assert_eq!(control, ControlHeader::Ignored(Value::String("{not json".into())));
    assert_eq!(control.to_string(), r#""{not json""#);
    assert_eq!(HeaderOverrides::from_headers(&headers), None);
  }

  #[test]
  fn non_object_control_header_keeps_its_json() {
    let control = ControlHeader::parse("[1,2]");

    assert_eq!(control.to_string(), "[1,2]");
    assert_eq!(control.into_overrides(), None);
  }
}
