// # dnsmasq Lease File
//
// One lease per line, whitespace separated:
//
// ```text
// <expiry-epoch> <mac> <ip> <hostname|*> <client-id|*>
// ```
//
// dnsmasq only keeps live bindings in this file, so every parsed line is
// active. Comments, lines with fewer than three fields, an unparsable MAC
// or an unparsable IP are skipped (this also drops the `duid` header line and
// DHCPv6 rows, which carry an IAID where the MAC would be).

use async_trait::async_trait;
use chrono::DateTime;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::lease::read_lease_file;
use crate::mac::MacAddress;
use crate::traits::{Lease, LeaseMap, LeaseSource};

/// dnsmasq lease file reader
#[derive(Debug, Clone)]
pub struct DnsmasqLeaseFile {
    path: PathBuf,
}

impl DnsmasqLeaseFile {
    /// Create a reader for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LeaseSource for DnsmasqLeaseFile {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn leases(&self) -> Result<LeaseMap> {
        let content = read_lease_file(&self.path).await?;
        Ok(parse_dnsmasq_leases(&content))
    }
}

/// Parse the contents of a dnsmasq.leases file
pub fn parse_dnsmasq_leases(content: &str) -> LeaseMap {
    let mut leases = LeaseMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            debug!("Skipping short dnsmasq lease line {}", index + 1);
            continue;
        }

        let Some(mac) = MacAddress::parse(fields[1]) else {
            debug!("Skipping dnsmasq lease line {}: bad MAC '{}'", index + 1, fields[1]);
            continue;
        };
        let Ok(ip) = fields[2].parse() else {
            debug!("Skipping dnsmasq lease line {}: bad IP '{}'", index + 1, fields[2]);
            continue;
        };
        let hostname = match fields.get(3) {
            Some(&"*") | None => None,
            Some(name) => Some(*name),
        };

        let mut lease = Lease::new(mac, ip, hostname);
        // 0 means an infinite lease
        lease.expires_at = fields[0]
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        leases.insert(mac, lease);
    }

    leases
}
