use std::sync::Arc;

use actix_web::dev::{self, Payload, Service, ServiceRequest, ServiceResponse};
use actix_web::error::PayloadError;
use actix_web::http::header::ContentType;
use actix_web::{HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_core::future::LocalBoxFuture;
use futures_util::StreamExt;
use log::{debug, error};
use reqwest::header::ORIGIN;
use reqwest::Client;

use crate::proxy_service::access_policy::Verdict;
use crate::proxy_service::header_filter::{self, ControlHeader, HeaderOverrides};
use crate::proxy_service::info_page::InfoPage;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::{describe, response_rewriter, target_url, ProxyError};
use crate::request_context::RequestContext;

pub struct ProxyRouteService {
  pub(super) config: Arc<ProxyConfig>,
  pub(super) http_client: Client,
}

impl Service<ServiceRequest> for ProxyRouteService {
  type Response = ServiceResponse;
  type Error = actix_web::Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  dev::always_ready!();

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let (http_request, payload) = req.into_parts();
    let config = self.config.clone();
    let http_client = self.http_client.clone();

    Box::pin(async move {
      let response = match ProxyRouteService::exec(&config, &http_client, &http_request, payload).await {
        Ok(response) => response,
        Err(err) => {
          let detail = describe(&err);
          error!("{} {} failed: {}", http_request.method(), http_request.uri(), detail);
          HttpResponse::InternalServerError()
            .content_type(ContentType::plaintext())
            .body(detail)
        }
      };

      Ok(ServiceResponse::new(http_request, response))
    })
  }
}

impl ProxyRouteService {
  async fn exec(
    config: &ProxyConfig,
    http_client: &Client,
    http: &HttpRequest,
    payload: Payload,
  ) -> Result<HttpResponse, ProxyError> {
    let context = RequestContext::from_request(http);
    let target = target_url::target_from_query(http.query_string());
    let verdict = config.policy.evaluate(&target, http.headers().get(ORIGIN));

    debug!("{} '{}' -> {:?}", http.method(), target, verdict);

    match verdict {
      Verdict::Forward => ProxyRouteService::forward(config, http_client, http, payload, &target, &context).await,
      Verdict::Deny(_) => Ok(ProxyRouteService::info_response(http, &context)),
    }
  }

  /// One upstream attempt, no retries. Transport failures bubble up as errors.
  async fn forward(
    config: &ProxyConfig,
    http_client: &Client,
    http: &HttpRequest,
    payload: Payload,
    target: &str,
    context: &RequestContext,
  ) -> Result<HttpResponse, ProxyError> {
    let overrides = HeaderOverrides::from_headers(http.headers());
    let outbound_headers = header_filter::sanitize(http.headers(), overrides.as_ref());
    let body = read_payload(payload, config.max_body_size).await?;

    let mut builder = http_client
      .request(http.method().clone(), target)
      .headers(outbound_headers);

    if !body.is_empty() {
      builder = builder.body(body);
    }

    let upstream = builder.send().await?;
    debug!("Upstream '{}' answered {}", target, upstream.status());

    response_rewriter::rewrite(http, target, &context.own_origin, upstream)
  }

  fn info_response(http: &HttpRequest, context: &RequestContext) -> HttpResponse {
    let control_header = ControlHeader::from_headers(http.headers());
    let origin = http
      .headers()
      .get(ORIGIN)
      .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let page = InfoPage {
      context,
      origin: origin.as_deref(),
      control_header: control_header.as_ref(),
    };

    let mut response = HttpResponse::Ok()
      .content_type(ContentType::plaintext())
      .body(page.to_string());
    response_rewriter::apply_cors_headers(response.headers_mut(), http);

    response
  }
}

async fn read_payload(mut payload: Payload, limit: usize) -> Result<Bytes, PayloadError> {
  let mut body_buffer = BytesMut::new();

  while let Some(chunk) = payload.next().await {
    let chunk = chunk?;
    if body_buffer.len() + chunk.len() > limit {
      return Err(PayloadError::Overflow);
    }

    body_buffer.extend_from_slice(&chunk);
  }

  Ok(body_buffer.freeze())
}
