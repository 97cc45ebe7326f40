//! Lease file readers
//!
//! Two on-disk formats are supported, ISC dhcpd and dnsmasq. [`open`] builds
//! the reader for a single configured file; [`open_all`] merges every
//! configured file into one [`MultiLeaseSource`].

mod dnsmasq;
mod isc;
mod multi;

pub use dnsmasq::{DnsmasqLeaseFile, parse_dnsmasq_leases};
pub use isc::{IscLeaseFile, parse_isc_leases};
pub use multi::MultiLeaseSource;

use std::path::Path;

use crate::config::{LeaseFormat, LeaseSourceConfig};
use crate::error::{Error, Result};
use crate::traits::LeaseSource;

/// Build the reader for one lease file
pub fn open(config: &LeaseSourceConfig) -> Box<dyn LeaseSource> {
    match config.format.resolve(&config.path) {
        LeaseFormat::Dnsmasq => Box::new(DnsmasqLeaseFile::new(&config.path)),
        LeaseFormat::Isc | LeaseFormat::Auto => Box::new(IscLeaseFile::new(&config.path)),
    }
}

/// Build a merged reader over every configured lease file
pub fn open_all(configs: &[LeaseSourceConfig], debug: bool) -> Result<MultiLeaseSource> {
    let sources = configs.iter().map(open).collect();
    Ok(MultiLeaseSource::new(sources)?.with_debug(debug))
}

// Lease files are plain ASCII in practice, but dhcpd may write escaped
// option bytes; decode lossily rather than failing the whole file.
pub(crate) async fn read_lease_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::lease_read(path.display().to_string(), e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
