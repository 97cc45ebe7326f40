//! Clap derive structures for the `leasesyncd` CLI.
//!
//! Every flag has an environment fallback so the daemon can run from an
//! rc.d script or a systemd unit with no arguments besides the subcommand.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use leasesync_core::{
    EngineConfig, FetchErrorPolicy, LeaseFormat, LeaseSourceConfig, NeighborConfig,
    NeighborDialect, RegistryConfig, SyncConfig,
};
use tracing::Level;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// leasesyncd -- mirror DHCP leases into AdGuard Home clients
#[derive(Debug, Parser)]
#[command(
    name = "leasesyncd",
    version,
    about = "Keep AdGuard Home persistent clients in sync with DHCP leases",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one reconciliation pass and exit
    Sync,

    /// Watch lease files and the neighbor table until SIGINT/SIGTERM
    Serve,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// AdGuard Home host:port or base URL
    #[arg(long, env = "ADGUARD_URL", default_value = "127.0.0.1:3000", global = true)]
    pub adguard_url: String,

    /// Scheme used when the URL has none
    #[arg(
        long,
        env = "ADGUARD_SCHEME",
        default_value = "http",
        value_parser = ["http", "https"],
        global = true
    )]
    pub scheme: String,

    /// AdGuard Home username
    #[arg(long, env = "ADGUARD_USERNAME", default_value = "", global = true)]
    pub username: String,

    /// AdGuard Home password
    #[arg(
        long,
        env = "ADGUARD_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub password: String,

    /// Request timeout in seconds
    #[arg(long, env = "ADGUARD_TIMEOUT", default_value_t = 10, global = true)]
    pub timeout: u64,

    /// Lease file(s); repeat the flag or separate with commas
    #[arg(
        long,
        env = "DHCP_LEASE_PATH",
        value_delimiter = ',',
        default_value = "/var/dhcpd/var/db/dhcpd.leases",
        global = true
    )]
    pub lease_path: Vec<PathBuf>,

    /// Lease file format: auto, isc or dnsmasq
    #[arg(long, env = "LEASESYNC_LEASE_FORMAT", default_value = "auto", global = true)]
    pub lease_format: LeaseFormat,

    /// Log planned changes without touching AdGuard Home
    #[arg(long, env = "DRY_RUN", value_parser = BoolishValueParser::new(), global = true)]
    pub dry_run: bool,

    /// Keep clients whose lease has gone away
    #[arg(
        long,
        env = "PRESERVE_DELETED_HOSTS",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub preserve_deleted_hosts: bool,

    /// Verbose per-device logging (implies --log-level debug)
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new(), global = true)]
    pub debug: bool,

    /// Seconds between IPv6 neighbor table refreshes
    #[arg(long, env = "NDP_UPDATE_INTERVAL", default_value_t = 30, global = true)]
    pub ndp_interval: u64,

    /// Do not merge IPv6 neighbors into client identifiers
    #[arg(
        long,
        env = "LEASESYNC_NO_NEIGHBORS",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub no_neighbors: bool,

    /// Neighbor command: auto, ndp or ip-neigh
    #[arg(long, env = "LEASESYNC_NEIGHBOR_DIALECT", default_value = "auto", global = true)]
    pub neighbor_dialect: NeighborDialect,

    /// Name new devices without a DHCP hostname via reverse DNS
    #[arg(
        long,
        env = "LEASESYNC_REVERSE_DNS",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub reverse_dns: bool,

    /// What a pass does when AdGuard cannot be listed: abort or treat-as-empty
    #[arg(long, env = "LEASESYNC_FETCH_ERROR_POLICY", default_value = "abort", global = true)]
    pub fetch_error_policy: FetchErrorPolicy,

    /// Quiet period after a lease file change before a pass runs
    #[arg(long, env = "LEASESYNC_DEBOUNCE_MS", default_value_t = 2000, global = true)]
    pub debounce_ms: u64,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "LEASESYNC_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

impl GlobalOpts {
    /// Build the engine configuration from the parsed flags
    pub fn to_config(&self) -> SyncConfig {
        SyncConfig {
            leases: self
                .lease_path
                .iter()
                .map(|path| LeaseSourceConfig::new(path).with_format(self.lease_format))
                .collect(),
            registry: RegistryConfig {
                url: self.adguard_url.clone(),
                scheme: self.scheme.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
                timeout_secs: self.timeout,
            },
            engine: EngineConfig {
                dry_run: self.dry_run,
                preserve_deleted_hosts: self.preserve_deleted_hosts,
                debounce_millis: self.debounce_ms,
                reverse_dns_fallback: self.reverse_dns,
                fetch_error_policy: self.fetch_error_policy,
                debug: self.debug,
                ..EngineConfig::default()
            },
            neighbors: NeighborConfig {
                enabled: !self.no_neighbors,
                refresh_interval_secs: self.ndp_interval,
                dialect: self.neighbor_dialect,
            },
        }
    }

    /// Effective tracing level; `--debug` wins over `--log-level`
    pub fn tracing_level(&self) -> anyhow::Result<Level> {
        if self.debug {
            return Ok(Level::DEBUG);
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!(
                "LEASESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }
    }
}
