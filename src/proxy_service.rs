use std::error::Error;

use actix_web::error::PayloadError;
use reqwest::header::{HeaderName, InvalidHeaderValue};
use thiserror::Error;

pub mod access_policy;
pub mod header_filter;
pub mod info_page;
pub mod proxy_config;
pub mod proxy_factory;
pub mod proxy_route_service;
pub mod response_rewriter;
pub mod target_url;

/// Framing and connection headers owned by whichever side opens the connection.
const TRANSPORT_HEADERS: [&str; 9] = [
  "host",
  "connection",
  "keep-alive",
  "proxy-connection",
  "transfer-encoding",
  "te",
  "trailer",
  "upgrade",
  "content-length",
];

#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("unable to read request body")]
  Payload(#[from] PayloadError),
  #[error("upstream request failed")]
  Upstream(#[from] reqwest::Error),
  #[error("unable to resolve redirect location '{location}'")]
  Redirect {
    location: String,
    #[source]
    source: url::ParseError,
  },
  #[error("invalid response header")]
  HeaderValue(#[from] InvalidHeaderValue),
}

#[inline]
pub(crate) fn is_transport_header(name: &HeaderName) -> bool {
  TRANSPORT_HEADERS.contains(&name.as_str())
}

/// Error message followed by its whole source chain, one cause per line.
pub fn describe(error: &dyn Error) -> String {
  let mut text = error.to_string();
  let mut source = error.source();

  while let Some(cause) = source {
    text.push_str("\ncaused by: ");
    text.push_str(&cause.to_string());
    source = cause.source();
  }

  text
}
