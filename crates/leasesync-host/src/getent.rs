// Reverse lookups through the system resolver (`getent hosts <ip>`),
// so /etc/hosts and the configured DNS both apply.

use async_trait::async_trait;
use leasesync_core::{Error, HostnameResolver, Result};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::{DEFAULT_COMMAND_TIMEOUT, run_command};

/// `getent` exits with 2 when the key is not found
const GETENT_NOT_FOUND: i32 = 2;

/// Hostname resolver backed by `getent hosts`
#[derive(Debug, Clone)]
pub struct GetentResolver {
    timeout: Duration,
}

impl GetentResolver {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GetentResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostnameResolver for GetentResolver {
    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>> {
        let ip_str = ip.to_string();
        let output = run_command("getent", &["hosts", &ip_str], self.timeout, Error::Other).await?;

        match output.status {
            Some(0) => {
                let name = output
                    .stdout
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(short_hostname);
                debug!("getent resolved {} to {:?}", ip, name);
                Ok(name)
            }
            Some(GETENT_NOT_FOUND) => Ok(None),
            status => Err(Error::Other(format!(
                "getent hosts {ip} exited with {status:?}: {}",
                output.stderr
            ))),
        }
    }
}

/// First DNS label of `fqdn`, or `None` if that label is empty
pub fn short_hostname(fqdn: &str) -> Option<String> {
    let label = fqdn.trim_end_matches('.').split('.').next()?.trim();
    (!label.is_empty()).then(|| label.to_string())
}
