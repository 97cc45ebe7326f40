// # Lease Source Trait
//
// Defines the interface for reading a DHCP lease store.
//
// ## Implementations
//
// - ISC dhcpd block format: `lease::IscLeaseFile`
// - dnsmasq line format: `lease::DnsmasqLeaseFile`
// - Several files merged into one view: `lease::MultiLeaseSource`
//
// ## Usage
//
// ```rust,ignore
// use leasesync_core::LeaseSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* LeaseSource implementation */;
//
//     for (mac, lease) in source.leases().await? {
//         println!("{mac} -> {} ({:?})", lease.ip, lease.hostname);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use crate::mac::MacAddress;

/// A single address binding read from a lease store
///
/// Leases are rebuilt on every read and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Leased address
    pub ip: IpAddr,
    /// Client-supplied hostname, if any
    pub hostname: Option<String>,
    /// Hardware address, the join key across all sources
    pub mac: MacAddress,
    /// Whether the server considers the binding active
    pub is_active: bool,
    /// Expiry time, when the format records one (informational)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Lease {
    /// Create an active lease without expiry information
    pub fn new(mac: MacAddress, ip: IpAddr, hostname: Option<&str>) -> Self {
        Self {
            ip,
            hostname: hostname.filter(|h| !h.is_empty()).map(str::to_string),
            mac,
            is_active: true,
            expires_at: None,
        }
    }

    /// Mark the lease inactive
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Leases keyed by canonical MAC
pub type LeaseMap = BTreeMap<MacAddress, Lease>;

/// Trait for lease store readers
///
/// Implementations re-read their backing store on every call; nothing is
/// cached between passes.
#[async_trait]
pub trait LeaseSource: Send + Sync {
    /// Path of the backing store (used for logging and file watching)
    fn path(&self) -> &Path;

    /// Read the current leases
    ///
    /// # Returns
    ///
    /// - `Ok(LeaseMap)`: Leases keyed by MAC (inactive leases included)
    /// - `Err(Error::LeaseRead)`: If the store could not be read
    async fn leases(&self) -> Result<LeaseMap, crate::Error>;

    /// Every file this source reads
    ///
    /// Single-file readers return their own path; merged sources return all
    /// of their members so each can be watched.
    fn watched_paths(&self) -> Vec<&Path> {
        vec![self.path()]
    }
}
