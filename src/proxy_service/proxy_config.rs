use crate::proxy_service::access_policy::PolicyLists;

pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Read-only state shared by every worker.
pub struct ProxyConfig {
  pub policy: PolicyLists,
  /// Largest inbound request body buffered for the upstream call, in bytes.
  pub max_body_size: usize,
}
