// # leasesync-core
//
// Core library for keeping a DNS filter's client registry in step with a
// DHCP server's leases.
//
// ## Architecture Overview
//
// - **LeaseSource**: Trait for reading DHCP lease files (ISC dhcpd, dnsmasq)
// - **ClientRegistry**: Trait for listing and mutating remote named clients
// - **NeighborProbe**: Trait for sampling the IPv6 neighbor table
// - **NeighborWatcher**: Periodic neighbor sampling with change detection
// - **SyncEngine**: Diffs leases + neighbors against the registry and applies
//   the result, on startup and whenever a lease file or neighbor changes
//
// ## Design Principles
//
// 1. **MAC is the join key**: every address is canonicalized through
//    `MacAddress` before comparison
// 2. **Event-Driven**: file notifications and neighbor snapshots trigger passes
// 3. **Library-First**: concrete registries and probes live in their own crates
// 4. **Idempotency**: a pass over unchanged inputs issues no mutations

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;
pub mod lease;
pub mod mac;
pub mod neighbor;

// Re-export core types for convenience
pub use traits::{
    ClientRegistry, HostnameResolver, Lease, LeaseMap, LeaseSource, NeighborProbe, NeighborTable,
    RemoteClient,
};
pub use engine::{EngineEvent, PassSummary, SyncEngine};
pub use config::{
    EngineConfig, FetchErrorPolicy, LeaseFormat, LeaseSourceConfig, NeighborConfig,
    NeighborDialect, RegistryConfig, SyncConfig,
};
pub use error::{Error, Result};
pub use mac::MacAddress;
pub use neighbor::{NeighborSnapshot, NeighborWatcher};
