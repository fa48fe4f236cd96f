use actix_web::body::{BodyStream, BoxBody};
use actix_web::http::header::HeaderMap as ResponseHeaders;
use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse};
use reqwest::header::{
  HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
  ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
  ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, LOCATION, ORIGIN,
  X_CONTENT_TYPE_OPTIONS,
};
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::proxy_service::{is_transport_header, ProxyError};

/// JSON copy of every upstream header, readable by the calling page.
pub const RECEIVED_HEADERS: &str = "cors-received-headers";

const REDIRECT_STATUSES: [StatusCode; 5] = [
  StatusCode::MOVED_PERMANENTLY,
  StatusCode::FOUND,
  StatusCode::SEE_OTHER,
  StatusCode::TEMPORARY_REDIRECT,
  StatusCode::PERMANENT_REDIRECT,
];

pub fn is_preflight(request: &HttpRequest) -> bool {
  request.method() == Method::OPTIONS
}

/// Echoes the caller's origin and, for preflights, grants what was asked for.
pub fn apply_cors_headers(headers: &mut ResponseHeaders, request: &HttpRequest) {
  let inbound = request.headers();
  let allow_origin = inbound
    .get(ORIGIN)
    .filter(|origin| !origin.is_empty())
    .cloned()
    .unwrap_or_else(|| HeaderValue::from_static("*"));
  headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);

  if is_preflight(request) {
    if let Some(method) = inbound.get(ACCESS_CONTROL_REQUEST_METHOD) {
      headers.insert(ACCESS_CONTROL_ALLOW_METHODS, method.clone());
    }

    if let Some(requested) = inbound.get(ACCESS_CONTROL_REQUEST_HEADERS).filter(|v| !v.is_empty()) {
      headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }

    headers.remove(X_CONTENT_TYPE_OPTIONS);
  }
}

/// Upstream header names followed by `cors-received-headers`.
pub fn expose_headers(upstream: &HeaderMap) -> String {
  upstream
    .keys()
    .map(HeaderName::as_str)
    .chain(std::iter::once(RECEIVED_HEADERS))
    .collect::<Vec<_>>()
    .join(",")
}

/// Header bytes read one char per byte, the way a Fetch `ByteString` is.
fn byte_string(bytes: &[u8]) -> String {
  bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Repeated headers are folded into one `", "` separated value.
pub fn received_headers(upstream: &HeaderMap) -> String {
  let mut received = Map::new();

  for name in upstream.keys() {
    let joined = upstream
      .get_all(name)
      .iter()
      .map(|value| byte_string(value.as_bytes()))
      .collect::<Vec<_>>()
      .join(", ");

    received.insert(name.as_str().to_owned(), Value::String(joined));
  }

  Value::Object(received).to_string()
}

/// `received_headers` written back one byte per char, so upstream bytes
/// outside ASCII come out exactly as they went in.
pub fn received_headers_value(upstream: &HeaderMap) -> Result<HeaderValue, InvalidHeaderValue> {
  // no char above U+00FF: names are ASCII, values come from `byte_string`
  let bytes: Vec<u8> = received_headers(upstream).chars().map(|c| c as u8).collect();

  HeaderValue::from_bytes(&bytes)
}

/// Points a 3xx `Location` back at the proxy so the browser re-enters it for
/// the next hop. Relative locations resolve against the target.
pub fn rewrite_location(
  status: StatusCode,
  upstream: &HeaderMap,
  target: &str,
  own_origin: &str,
) -> Result<Option<HeaderValue>, ProxyError> {
  if !REDIRECT_STATUSES.contains(&status) {
    return Ok(None);
  }

  let location = match upstream.get(LOCATION).filter(|value| !value.is_empty()) {
    Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
    None => return Ok(None),
  };

  let resolved = Url::parse(target)
    .and_then(|base| base.join(&location))
    .map_err(|source| ProxyError::Redirect {
      location: location.clone(),
      source,
    })?;

  let rewritten = HeaderValue::try_from(format!("{}/?{}", own_origin, resolved))?;
  Ok(Some(rewritten))
}

/// Turns the upstream response into the one handed back to the caller. The
/// body is streamed through, except for preflights which are always an empty
/// `200 OK`.
pub fn rewrite(
  request: &HttpRequest,
  target: &str,
  own_origin: &str,
  upstream: Response,
) -> Result<HttpResponse, ProxyError> {
  let status = upstream.status();
  let upstream_headers = upstream.headers();

  let mut response = HttpResponse::new(status);
  let headers = response.headers_mut();

  for (name, value) in upstream_headers.iter() {
    if !is_transport_header(name) {
      headers.append(name.clone(), value.clone());
    }
  }

  apply_cors_headers(headers, request);
  headers.insert(
    ACCESS_CONTROL_EXPOSE_HEADERS,
    HeaderValue::try_from(expose_headers(upstream_headers))?,
  );
  headers.insert(
    HeaderName::from_static(RECEIVED_HEADERS),
    received_headers_value(upstream_headers)?,
  );

  if let Some(location) = rewrite_location(status, upstream_headers, target, own_origin)? {
    headers.insert(LOCATION, location);
  }

  if is_preflight(request) {
    *response.status_mut() = StatusCode::OK;
    return Ok(response);
  }

  let body = BodyStream::new(upstream.bytes_stream());
  Ok(response.set_body(BoxBody::new(body)))
}
