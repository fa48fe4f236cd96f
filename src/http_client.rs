use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::Client;

pub struct HttpClientConfig {
  pub http_proxy: Option<String>,
  pub user: Option<String>,
  pub pass: Option<String>,
  pub connect_timeout: Duration,
}

impl HttpClientConfig {
  /// Builds the upstream client.
  ///
  /// Redirects are never followed here: every 3xx has to travel back through the
  /// response rewriter so its `Location` points at the proxy again. There is no
  /// cookie store, cookies belong to the calling page.
  pub fn to_client(self) -> Result<Client, reqwest::Error> {
    let HttpClientConfig {
      http_proxy,
      user,
      pass,
      connect_timeout,
    } = self;
    let mut client_builder = reqwest::ClientBuilder::new();

    if let Some(proxy_url) = http_proxy {
      let mut proxy = reqwest::Proxy::all(proxy_url)?;

      if let (Some(user_name), Some(password)) = (user, pass) {
        proxy = proxy.basic_auth(&user_name, &password);
      }

      client_builder = client_builder.proxy(proxy);
    }

    let client = client_builder
      .connect_timeout(connect_timeout)
      .redirect(Policy::none())
      .build()?;

    Ok(client)
  }
}
