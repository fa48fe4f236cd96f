use actix_web::HttpRequest;

const CONNECTING_IP: &str = "cf-connecting-ip";
const COUNTRY: &str = "cf-ipcountry";
const RAY: &str = "cf-ray";

/// Per request facts supplied by the hosting side rather than the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
  /// `<scheme>://<host>` the caller used to reach the proxy.
  pub own_origin: String,
  pub connecting_ip: Option<String>,
  pub country: Option<String>,
  pub colo: Option<String>,
}

impl RequestContext {
  pub fn from_request(request: &HttpRequest) -> RequestContext {
    let info = request.connection_info();
    let own_origin = format!("{}://{}", info.scheme(), info.host());

    let connecting_ip = header_text(request, CONNECTING_IP)
      .or_else(|| info.peer_addr().map(String::from));

    // cf-ray looks like `<id>-<COLO>`
    let colo = header_text(request, RAY)
      .and_then(|ray| ray.rsplit_once('-').map(|(_, colo)| colo.to_owned()))
      .filter(|colo| !colo.is_empty());

    RequestContext {
      own_origin,
      connecting_ip,
      country: header_text(request, COUNTRY),
      colo,
    }
  }
}

fn header_text(request: &HttpRequest, name: &str) -> Option<String> {
  request
    .headers()
    .get(name)
    .and_then(|value| value.to_str().ok())
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(String::from)
}

#[cfg(test)]
mod tests {
  use actix_web::test::TestRequest;

  use super::*;

  #[test]
  fn reads_platform_headers() {
    let request = TestRequest::get()
      .insert_header(("CF-Connecting-IP", "203.0.113.9"))
      .insert_header(("CF-IPCountry", "DE"))
      .insert_header(("CF-Ray", "8a1b2c3d4e5f6071-FRA"))
      .to_http_request();

    let context = RequestContext::from_request(&request);

    assert_eq!(context.own_origin, "http://localhost:8080");
    assert_eq!(context.connecting_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(context.country.as_deref(), Some("DE"));
    assert_eq!(context.colo.as_deref(), Some("FRA"));
  }

  #[test]
  fn falls_back_to_peer_address() {
    let request = TestRequest::get()
      .peer_addr("198.51.100.4:50000".parse().unwrap())
      .to_http_request();

    let context = RequestContext::from_request(&request);

    assert_eq!(context.connecting_ip.as_deref(), Some("198.51.100.4"));
    assert_eq!(context.country, None);
    assert_eq!(context.colo, None);
  }

  #[test]
  fn uses_host_header_for_own_origin() {
    let request = TestRequest::get()
      .insert_header(("Host", "cors.example.net"))
      .to_http_request();

    assert_eq!(RequestContext::from_request(&request).own_origin, "http://cors.example.net");
  }
}
