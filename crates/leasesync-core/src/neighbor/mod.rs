//! IPv6 neighbor table tracking
//!
//! A [`NeighborProbe`](crate::traits::NeighborProbe) takes single samples;
//! [`NeighborWatcher`] refreshes them periodically and publishes each
//! changed table as an immutable [`NeighborSnapshot`].

mod watcher;

pub use watcher::{NeighborWatcher, SnapshotStream};

use std::collections::HashSet;

use crate::mac::MacAddress;
use crate::traits::NeighborTable;

/// Immutable view of the neighbor table at one point in time
///
/// Snapshots are shared as `Arc<NeighborSnapshot>` and replaced wholesale,
/// so a reader never sees a half-applied refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborSnapshot {
    entries: NeighborTable,
}

impl NeighborSnapshot {
    /// Wrap a probed table
    pub fn new(entries: NeighborTable) -> Self {
        Self { entries }
    }

    /// IPv6 addresses seen for `mac`, in probe order
    pub fn addresses_for(&self, mac: &MacAddress) -> &[String] {
        self.entries.get(mac).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of MACs with at least one address
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(mac, addresses)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&MacAddress, &Vec<String>)> {
        self.entries.iter()
    }

    /// Whether `table` differs from this snapshot
    ///
    /// Address order within a MAC is ignored.
    pub fn differs_from(&self, table: &NeighborTable) -> bool {
        has_changed(&self.entries, table)
    }
}

/// Order-insensitive comparison of two neighbor tables
pub fn has_changed(old: &NeighborTable, new: &NeighborTable) -> bool {
    if old.len() != new.len() {
        return true;
    }

    new.iter().any(|(mac, new_addrs)| match old.get(mac) {
        None => true,
        Some(old_addrs) => {
            let old_set: HashSet<&String> = old_addrs.iter().collect();
            let new_set: HashSet<&String> = new_addrs.iter().collect();
            old_set != new_set
        }
    })
}
