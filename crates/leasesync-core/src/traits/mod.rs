//! Core traits for the lease synchronization system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`LeaseSource`]: Read DHCP lease stores
//! - [`ClientRegistry`]: List and mutate clients in the remote registry
//! - [`NeighborProbe`]: Sample the IPv6 neighbor table
//! - [`HostnameResolver`]: Optional reverse lookups for unnamed leases

pub mod lease_source;
pub mod client_registry;
pub mod neighbor_probe;

pub use lease_source::{Lease, LeaseMap, LeaseSource};
pub use client_registry::{ClientRegistry, RemoteClient};
pub use neighbor_probe::{HostnameResolver, NeighborProbe, NeighborTable};
