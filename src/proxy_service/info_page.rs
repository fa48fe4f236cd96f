use std::fmt::{Display, Formatter};

use crate::proxy_service::header_filter::ControlHeader;
use crate::request_context::RequestContext;

pub const BANNER: &str = "CLOUDFLARE-CORS-ANYWHERE";
pub const SOURCE_URL: &str = "https://github.com/Zibri/cloudflare-cors-anywhere";
pub const DONATE_URL: &str = "https://paypal.me/Zibri/5";

/// Plain text usage page served when nothing is forwarded.
pub struct InfoPage<'a> {
  pub context: &'a RequestContext,
  pub origin: Option<&'a str>,
  pub control_header: Option<&'a ControlHeader>,
}

impl Display for InfoPage<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}\n\n", BANNER)?;
    write!(f, "Source:\n{}\n\n", SOURCE_URL)?;
    write!(f, "Usage:\n{}/?uri\n\n", self.context.own_origin)?;
    write!(f, "Donate:\n{}\n\n", DONATE_URL)?;
    f.write_str("Limits: 100,000 requests/day\n")?;
    f.write_str("          1,000 requests/10 minutes\n\n")?;

    if let Some(origin) = self.origin {
      writeln!(f, "Origin: {}", origin)?;
    }
    if let Some(ip) = &self.context.connecting_ip {
      writeln!(f, "IP: {}", ip)?;
    }
    if let Some(country) = &self.context.country {
      writeln!(f, "Country: {}", country)?;
    }
    if let Some(colo) = &self.context.colo {
      writeln!(f, "Datacenter: {}", colo)?;
    }
    f.write_str("\n")?;

    if let Some(control_header) = self.control_header {
      write!(f, "\nx-cors-headers: {}", control_header)?;
    }

    Ok(())
  }
}
