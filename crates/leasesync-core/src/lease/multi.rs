// # Merged Lease Sources
//
// Presents several lease files as one. Sources are read in configured
// order and merged by MAC, so a later file overrides an earlier one for the
// same device. Missing files are skipped silently; unreadable ones are
// logged and skipped. If no source could be read at all the merge fails,
// because an empty result would look like "every lease expired".

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::traits::{LeaseMap, LeaseSource};

/// Several lease sources merged into one view
pub struct MultiLeaseSource {
    sources: Vec<Box<dyn LeaseSource>>,
    debug: bool,
}

impl MultiLeaseSource {
    /// Create a merged source
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `sources` is empty.
    pub fn new(sources: Vec<Box<dyn LeaseSource>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::config("At least one lease source is required"));
        }
        Ok(Self {
            sources,
            debug: false,
        })
    }

    /// Log every merged lease at debug level
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.path().display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl LeaseSource for MultiLeaseSource {
    /// Path of the first configured source
    fn path(&self) -> &Path {
        self.sources[0].path()
    }

    async fn leases(&self) -> Result<LeaseMap> {
        let mut merged = LeaseMap::new();
        let mut readable = 0usize;
        let mut failures = Vec::new();

        for source in &self.sources {
            let path = source.path();
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                debug!("Lease file {} does not exist, skipping", path.display());
                continue;
            }

            match source.leases().await {
                Ok(leases) => {
                    readable += 1;
                    debug!("Read {} leases from {}", leases.len(), path.display());
                    for (mac, lease) in leases {
                        if self.debug {
                            debug!(
                                "Lease {} -> {} ({}) active={}",
                                mac,
                                lease.ip,
                                lease.hostname.as_deref().unwrap_or("-"),
                                lease.is_active
                            );
                        }
                        merged.insert(mac, lease);
                    }
                }
                Err(e) => {
                    error!("Error reading leases from {}: {}", path.display(), e);
                    failures.push(e.to_string());
                }
            }
        }

        if readable == 0 {
            let message = if failures.is_empty() {
                "no lease file exists".to_string()
            } else {
                failures.join("; ")
            };
            return Err(Error::lease_read(self.describe(), message));
        }

        debug!(
            "Merged {} leases from {} of {} source(s)",
            merged.len(),
            readable,
            self.sources.len()
        );
        Ok(merged)
    }

    fn watched_paths(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .flat_map(|s| s.watched_paths())
            .collect()
    }
}
