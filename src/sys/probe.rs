// src/sys/probe.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::sys::domain::Domain;
use crate::sys::traits::CommandRunner;

/// Status code of the first response in `curl -I` output.
pub fn parse_status(head: &str) -> Option<u16> {
    head.lines()
        .find(|line| line.starts_with("HTTP/"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

/// HTTP probe against a domain, via `curl`.
pub struct ReachabilityProbe {
    runner: Arc<dyn CommandRunner>,
    connect_timeout: String,
    marker: String,
}

impl ReachabilityProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, connect_timeout: Duration, marker: String) -> Self {
        Self {
            runner,
            connect_timeout: connect_timeout.as_secs().max(1).to_string(),
            marker,
        }
    }

    fn url(domain: &Domain) -> String {
        format!("http://{domain}")
    }

    /// HEAD request. `None` when nothing answered.
    pub async fn head_status(&self, domain: &Domain) -> Option<u16> {
        let url = Self::url(domain);
        let args = ["-s", "-I", "--connect-timeout", self.connect_timeout.as_str(), url.as_str()];
        match self.runner.run("curl", &args).await {
            Ok(out) if out.success() => parse_status(&out.stdout),
            Ok(out) => {
                warn!(domain = %domain, code = ?out.code, "HEAD probe got no response");
                None
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "HEAD probe failed to run");
                None
            }
        }
    }

    async fn body(&self, domain: &Domain) -> Option<String> {
        let url = Self::url(domain);
        let args = ["-s", "--connect-timeout", self.connect_timeout.as_str(), url.as_str()];
        match self.runner.run("curl", &args).await {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(_) | Err(_) => None,
        }
    }

    /// True when the domain answers 200 and serves the status page.
    pub async fn verify_reachable(&self, domain: &Domain) -> bool {
        match self.head_status(domain).await {
            Some(200) => {}
            status => {
                warn!(domain = %domain, ?status, "site did not answer 200");
                return false;
            }
        }

        match self.body(domain).await {
            Some(body) if body.contains(&self.marker) => {
                info!(domain = %domain, "site serves the status page");
                true
            }
            _ => {
                warn!(domain = %domain, "site answered with unexpected content");
                false
            }
        }
    }

    /// True while the daemon still serves the domain (200 or 301).
    pub async fn still_served(&self, domain: &Domain) -> bool {
        matches!(self.head_status(domain).await, Some(200 | 301))
    }
}
