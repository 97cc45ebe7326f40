// # Neighbor Probe Trait
//
// Defines the interface for sampling the kernel's IPv6 neighbor table.
//
// IPv6 addresses never show up in DHCPv4 leases, so the engine learns them
// from the neighbor cache instead. A probe takes one sample; periodic
// refresh, change detection and fan-out live in `neighbor::NeighborWatcher`.
//
// ## Implementations
//
// - `ndp -an` / `ip -6 neigh show`: `leasesync-host` crate

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::mac::MacAddress;

/// One sample of the neighbor table: MAC -> IPv6 addresses in probe order
pub type NeighborTable = HashMap<MacAddress, Vec<String>>;

/// Trait for neighbor table probes
#[async_trait]
pub trait NeighborProbe: Send + Sync {
    /// Take one sample of the neighbor table
    ///
    /// # Returns
    ///
    /// - `Ok(NeighborTable)`: Current associations (possibly empty)
    /// - `Err(Error::NeighborProbe)`: If the probe could not run or parse
    async fn probe(&self) -> Result<NeighborTable, crate::Error>;

    /// Probe name (for logging)
    fn probe_name(&self) -> &'static str;
}

/// Trait for reverse hostname lookups
///
/// Used only when a new lease carries no hostname and the reverse-DNS
/// fallback is enabled.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    /// Resolve `ip` to a short hostname
    ///
    /// # Returns
    ///
    /// - `Ok(Some(name))`: A name was found
    /// - `Ok(None)`: No PTR record
    /// - `Err(Error)`: The lookup itself failed
    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>, crate::Error>;
}
