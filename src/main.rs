mod http_client;
mod policy_config;
mod proxy_service;
mod request_context;
mod std_logger;

use std::io::{Error, ErrorKind, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer};
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};

use http_client::HttpClientConfig;
use policy_config::PolicyConfigFile;
use proxy_service::access_policy::PolicyLists;
use proxy_service::proxy_config::{ProxyConfig, DEFAULT_MAX_BODY_SIZE};
use proxy_service::proxy_factory::ProxyRouteServiceFactory;
use std_logger::StdLogger;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for LevelFilter {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Error => LevelFilter::Error,
      LogLevel::Warn => LevelFilter::Warn,
      LogLevel::Info => LevelFilter::Info,
      LogLevel::Debug => LevelFilter::Debug,
      LogLevel::Trace => LevelFilter::Trace,
    }
  }
}

/// CORS forwarding proxy: `/?<url>` fetches `<url>` and answers with permissive CORS headers.
#[derive(Parser, Debug)]
#[command(name = "cors-anywhere", version)]
struct Settings {
  #[arg(long, env = "HTTP_BIND", default_value = "0.0.0.0")]
  bind: String,

  #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
  port: u16,

  #[arg(long, env = "HTTP_WORKER_COUNT", default_value_t = 4)]
  worker_count: usize,

  /// Egress proxy for upstream requests (http, https or socks5 url).
  #[arg(long, env = "HTTP_PROXY_URL")]
  proxy_url: Option<String>,

  #[arg(long, env = "HTTP_PROXY_USER")]
  proxy_auth_user: Option<String>,

  #[arg(long, env = "HTTP_PROXY_PASS", hide_env_values = true)]
  proxy_auth_pass: Option<String>,

  /// Largest request body forwarded upstream, in bytes.
  #[arg(long, env = "HTTP_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
  max_body_size: usize,

  /// Upstream connect timeout in seconds.
  #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT", default_value_t = 30)]
  connect_timeout: u64,

  /// YAML file with `deny_urls` and `allow_origins` pattern lists.
  #[arg(long, env = "POLICY_CONF_LOCATION")]
  policy_file: Option<PathBuf>,

  #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
  log_level: LogLevel,
}

#[actix_web::main]
async fn main() -> Result<()> {
  let settings = Settings::parse();
  StdLogger::init(settings.log_level.into()).map_err(|err| Error::new(ErrorKind::Other, err))?;

  let policy_file = match &settings.policy_file {
    Some(path) => PolicyConfigFile::load_from_file(path),
    None => Ok(PolicyConfigFile::default()),
  }
  .map_err(|err| Error::new(ErrorKind::Other, proxy_service::describe(&err)))?;

  let policy = PolicyLists::compile(&policy_file)
    .map_err(|err| Error::new(ErrorKind::Other, proxy_service::describe(&err)))?;
  info!(
    "Policy loaded with {} deny pattern(s) and {} allow pattern(s).",
    policy.deny_count(),
    policy.allow_count()
  );

  let http_client = HttpClientConfig {
    http_proxy: settings.proxy_url,
    user: settings.proxy_auth_user,
    pass: settings.proxy_auth_pass,
    connect_timeout: Duration::from_secs(settings.connect_timeout),
  }
  .to_client()
  .map_err(|err| Error::new(ErrorKind::Other, err))?;

  let proxy_config = Arc::new(ProxyConfig {
    policy,
    max_body_size: settings.max_body_size,
  });

  info!("Listening on {}:{} with {} worker(s).", settings.bind, settings.port, settings.worker_count);

  HttpServer::new(move || {
    App::new().default_service(ProxyRouteServiceFactory::create(http_client.clone(), proxy_config.clone()))
  })
  .workers(settings.worker_count)
  .bind((settings.bind, settings.port))?
  .run()
  .await
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn settings_definition_is_valid() {
    Settings::command().debug_assert();
  }

  #[test]
  fn settings_defaults() {
    let settings = Settings::try_parse_from(["cors-anywhere"]).unwrap();

    assert_eq!(settings.port, 8080);
    assert_eq!(settings.worker_count, 4);
    assert_eq!(settings.connect_timeout, 30);
    assert_eq!(settings.max_body_size, DEFAULT_MAX_BODY_SIZE);
    assert_eq!(settings.log_level, LogLevel::Info);
    assert!(settings.policy_file.is_none());
  }

  #[test]
  fn settings_from_flags() {
    let settings = Settings::try_parse_from([
      "cors-anywhere",
      "--port",
      "9000",
      "--log-level",
      "debug",
      "--policy-file",
      "/etc/cors/policy.yaml",
    ])
    .unwrap();

    assert_eq!(settings.port, 9000);
    assert_eq!(LevelFilter::from(settings.log_level), LevelFilter::Debug);
    assert_eq!(settings.policy_file, Some(PathBuf::from("/etc/cors/policy.yaml")));
  }
}
