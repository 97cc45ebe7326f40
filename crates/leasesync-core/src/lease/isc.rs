// # ISC dhcpd Lease File
//
// Reads the block-structured `dhcpd.leases` database:
//
// ```text
// lease 192.168.1.10 {
//   starts 4 2024/01/04 10:00:00;
//   ends 4 2024/01/04 12:00:00;
//   binding state active;
//   next binding state free;
//   hardware ethernet aa:bb:cc:dd:ee:ff;
//   client-hostname "laptop";
// }
// ```
//
// dhcpd appends a new block every time a binding changes, so a MAC can
// appear several times; the last block wins, except that a later inactive
// block for a different address (the device's previous IP being freed)
// never replaces an active lease. Blocks without a hardware address, with
// an unparsable address, or left unterminated are skipped.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::lease::read_lease_file;
use crate::mac::MacAddress;
use crate::traits::{Lease, LeaseMap, LeaseSource};

/// ISC dhcpd lease file reader
#[derive(Debug, Clone)]
pub struct IscLeaseFile {
    path: PathBuf,
}

impl IscLeaseFile {
    /// Create a reader for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LeaseSource for IscLeaseFile {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn leases(&self) -> Result<LeaseMap> {
        let content = read_lease_file(&self.path).await?;
        Ok(parse_isc_leases(&content))
    }
}

/// Fields collected while inside one `lease { ... }` block
#[derive(Default)]
struct PartialLease {
    ip: Option<IpAddr>,
    mac: Option<MacAddress>,
    hostname: Option<String>,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl PartialLease {
    fn open(header: &str) -> Self {
        let ip = header
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok());
        Self {
            ip,
            ..Self::default()
        }
    }

    fn apply(&mut self, line: &str) {
        let statement = line.trim_end_matches(';').trim();

        if let Some(state) = statement.strip_prefix("binding state ") {
            self.is_active = state.trim() == "active";
        } else if let Some(mac) = statement.strip_prefix("hardware ethernet ") {
            self.mac = MacAddress::parse(mac);
        } else if let Some(name) = statement.strip_prefix("client-hostname ") {
            let name = name.trim().trim_matches('"');
            self.hostname = (!name.is_empty()).then(|| name.to_string());
        } else if let Some(ends) = statement.strip_prefix("ends ") {
            self.expires_at = parse_isc_time(ends);
        }
    }

    fn finish(self) -> Option<Lease> {
        let ip = self.ip?;
        let mac = self.mac?;
        Some(Lease {
            ip,
            hostname: self.hostname,
            mac,
            is_active: self.is_active,
            expires_at: self.expires_at,
        })
    }
}

/// Parse the contents of a dhcpd.leases file
pub fn parse_isc_leases(content: &str) -> LeaseMap {
    let mut leases = LeaseMap::new();
    let mut current: Option<PartialLease> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix("lease ") {
            if current.is_some() {
                debug!("Unterminated lease block before '{}', skipping it", line);
            }
            current = Some(PartialLease::open(header));
            continue;
        }

        if line.starts_with('}') {
            if let Some(partial) = current.take() {
                match partial.finish() {
                    Some(lease) => merge_block(&mut leases, lease),
                    None => debug!("Skipping lease block without a valid address or MAC"),
                }
            }
            continue;
        }

        if let Some(partial) = current.as_mut() {
            partial.apply(line);
        }
    }

    if current.is_some() {
        debug!("Lease file ends inside a lease block, skipping it");
    }

    leases
}

fn merge_block(leases: &mut LeaseMap, lease: Lease) {
    if let Some(current) = leases.get(&lease.mac)
        && current.is_active
        && !lease.is_active
        && current.ip != lease.ip
    {
        debug!(
            "Keeping active lease {} for {}, ignoring freed {}",
            current.ip, lease.mac, lease.ip
        );
        return;
    }
    leases.insert(lease.mac, lease);
}

// `ends 4 2024/01/04 12:00:00`, `ends epoch 1704369600`, `ends never`
fn parse_isc_time(value: &str) -> Option<DateTime<Utc>> {
    let mut parts = value.split_whitespace();
    match parts.next()? {
        "never" => None,
        "epoch" => {
            let secs = parts.next()?.parse().ok()?;
            DateTime::from_timestamp(secs, 0)
        }
        _weekday => {
            let date = parts.next()?;
            let time = parts.next()?;
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y/%m/%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        }
    }
}
