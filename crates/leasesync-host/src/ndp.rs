// # Neighbor Table Probe
//
// Two output dialects are understood:
//
// ```text
// $ ndp -an
// Neighbor                             Linklayer Address  Netif Expire    S Flags
// fe80::1%igb0                         aa:bb:cc:dd:ee:ff    igb0 23h59m58s S R
// 2001:db8::10                         aa:bb:cc:dd:ee:ff    igb0 permanent R
//
// $ ip -6 neigh show
// fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff router REACHABLE
// 2001:db8::20 dev eth0  FAILED
// ```
//
// Rows without a usable MAC (`(incomplete)`, `FAILED`) are dropped, as are
// rows whose address is not IPv6. Zone suffixes (`%igb0`) are stripped so
// the address can be used as a client identifier.

use async_trait::async_trait;
use leasesync_core::config::NeighborDialect;
use leasesync_core::{Error, MacAddress, NeighborProbe, NeighborTable, Result};
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::debug;

use crate::{DEFAULT_COMMAND_TIMEOUT, run_command};

const NDP_ARGS: &[&str] = &["-an"];
const IP_NEIGH_ARGS: &[&str] = &["-6", "neigh", "show"];

/// Neighbor table probe backed by a system command
#[derive(Debug, Clone)]
pub struct NdpProbe {
    dialect: NeighborDialect,
    timeout: Duration,
}

impl NdpProbe {
    /// Create a probe; `Auto` is resolved for the running platform
    pub fn new(dialect: NeighborDialect) -> Self {
        Self {
            dialect: dialect.resolve(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The resolved dialect (never `Auto`)
    pub fn dialect(&self) -> NeighborDialect {
        self.dialect
    }

    fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self.dialect {
            NeighborDialect::IpNeigh => ("ip", IP_NEIGH_ARGS),
            NeighborDialect::Ndp | NeighborDialect::Auto => ("ndp", NDP_ARGS),
        }
    }
}

#[async_trait]
impl NeighborProbe for NdpProbe {
    async fn probe(&self) -> Result<NeighborTable> {
        let (program, args) = self.command();
        let output = run_command(program, args, self.timeout, Error::neighbor_probe).await?;

        if output.status != Some(0) {
            return Err(Error::neighbor_probe(format!(
                "'{program}' exited with {:?}: {}",
                output.status, output.stderr
            )));
        }

        let table = match self.dialect {
            NeighborDialect::IpNeigh => parse_ip_neigh_output(&output.stdout),
            NeighborDialect::Ndp | NeighborDialect::Auto => parse_ndp_output(&output.stdout),
        };
        debug!("{} reported {} devices", program, table.len());
        Ok(table)
    }

    fn probe_name(&self) -> &'static str {
        self.command().0
    }
}

/// Parse `ndp -an` output (header line first)
pub fn parse_ndp_output(output: &str) -> NeighborTable {
    let mut table = NeighborTable::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        insert_row(&mut table, fields[0], fields[1]);
    }
    table
}

/// Parse `ip -6 neigh show` output
pub fn parse_ip_neigh_output(output: &str) -> NeighborTable {
    let mut table = NeighborTable::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(address) = fields.first() else {
            continue;
        };
        let Some(mac) = fields
            .iter()
            .position(|f| *f == "lladdr")
            .and_then(|i| fields.get(i + 1))
        else {
            continue;
        };
        insert_row(&mut table, address, mac);
    }
    table
}

fn insert_row(table: &mut NeighborTable, address: &str, mac: &str) {
    let Some(mac) = MacAddress::parse(mac) else {
        return;
    };
    let address = address.split('%').next().unwrap_or(address);
    let Ok(address) = address.parse::<Ipv6Addr>() else {
        return;
    };

    let address = address.to_string();
    let addresses = table.entry(mac).or_default();
    if !addresses.contains(&address) {
        addresses.push(address);
    }
}
