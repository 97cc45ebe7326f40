//! Configuration types for the lease synchronization system
//!
//! One [`SyncConfig`] value is built at startup and handed to every
//! constructor. Nothing in the crate mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lease files to read, in merge order (later files win)
    pub leases: Vec<LeaseSourceConfig>,

    /// Remote registry connection settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Reconciliation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Neighbor table watcher settings
    #[serde(default)]
    pub neighbors: NeighborConfig,
}

impl SyncConfig {
    /// Create a configuration for a single lease file with defaults elsewhere
    pub fn new(lease_path: impl Into<PathBuf>) -> Self {
        Self {
            leases: vec![LeaseSourceConfig::new(lease_path)],
            registry: RegistryConfig::default(),
            engine: EngineConfig::default(),
            neighbors: NeighborConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.leases.is_empty() {
            return Err(crate::Error::config("No lease files configured"));
        }
        for lease in &self.leases {
            lease.validate()?;
        }

        self.registry.validate()?;
        self.engine.validate()?;
        self.neighbors.validate()?;

        Ok(())
    }
}

/// Lease file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSourceConfig {
    /// Path to the lease file
    pub path: PathBuf,

    /// File format (auto-detected from the path by default)
    #[serde(default)]
    pub format: LeaseFormat,
}

impl LeaseSourceConfig {
    /// Create a lease source configuration with auto-detected format
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: LeaseFormat::Auto,
        }
    }

    /// Set an explicit format
    pub fn with_format(mut self, format: LeaseFormat) -> Self {
        self.format = format;
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.path.as_os_str().is_empty() {
            return Err(crate::Error::config("Lease file path cannot be empty"));
        }
        Ok(())
    }
}

/// Lease file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseFormat {
    /// Pick the format from the file path
    #[default]
    Auto,
    /// ISC dhcpd block format (`lease <ip> { ... }`)
    Isc,
    /// dnsmasq line format (`<expiry> <mac> <ip> <hostname> <client-id>`)
    Dnsmasq,
}

impl LeaseFormat {
    /// Resolve `Auto` against a path; explicit formats are returned as-is
    pub fn resolve(self, path: &Path) -> LeaseFormat {
        match self {
            LeaseFormat::Auto => {
                if path.to_string_lossy().contains("dnsmasq") {
                    LeaseFormat::Dnsmasq
                } else {
                    LeaseFormat::Isc
                }
            }
            explicit => explicit,
        }
    }
}

impl std::str::FromStr for LeaseFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(LeaseFormat::Auto),
            "isc" | "dhcpd" => Ok(LeaseFormat::Isc),
            "dnsmasq" => Ok(LeaseFormat::Dnsmasq),
            other => Err(crate::Error::config(format!(
                "Unknown lease format '{other}'. Supported: auto, isc, dnsmasq"
            ))),
        }
    }
}

/// Remote registry connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Host:port or full base URL of the registry
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Scheme used when `url` carries none (`http` or `https`)
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Basic-auth username
    #[serde(default)]
    pub username: String,

    /// Basic-auth password
    #[serde(default)]
    pub password: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Keeps the password out of logs
impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("url", &self.url)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RegistryConfig {
    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.trim().is_empty() {
            return Err(crate::Error::config("Registry URL cannot be empty"));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(crate::Error::config(format!(
                "Registry scheme must be 'http' or 'https', got '{}'",
                self.scheme
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Registry timeout must be > 0"));
        }
        Ok(())
    }

    /// Base URL with scheme applied, without a trailing slash
    pub fn base_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}://{}", self.scheme, url)
        }
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            scheme: default_scheme(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// What a pass does when the registry cannot be listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorPolicy {
    /// Abort the pass; nothing is mutated
    #[default]
    Abort,
    /// Continue as if the registry were empty (every active lease is added)
    TreatAsEmpty,
}

impl std::str::FromStr for FetchErrorPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(FetchErrorPolicy::Abort),
            "treat_as_empty" | "empty" => Ok(FetchErrorPolicy::TreatAsEmpty),
            other => Err(crate::Error::config(format!(
                "Unknown fetch error policy '{other}'. Supported: abort, treat-as-empty"
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log intended mutations instead of calling the registry
    #[serde(default)]
    pub dry_run: bool,

    /// Never delete registry clients whose lease disappeared
    #[serde(default)]
    pub preserve_deleted_hosts: bool,

    /// Quiet period after a lease file change before a pass runs
    #[serde(default = "default_debounce_millis")]
    pub debounce_millis: u64,

    /// Highest numeric suffix tried when a new client's name is taken
    ///
    /// With the default of 10 a persistent conflict costs 11 create calls:
    /// `name`, `name-1` .. `name-10`.
    #[serde(default = "default_max_name_suffix")]
    pub max_name_suffix: usize,

    /// Look up a hostname via reverse DNS when a new lease carries none
    #[serde(default)]
    pub reverse_dns_fallback: bool,

    /// Behavior when listing the registry fails
    #[serde(default)]
    pub fetch_error_policy: FetchErrorPolicy,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Verbose per-device diagnostics
    #[serde(default)]
    pub debug: bool,
}

impl EngineConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            preserve_deleted_hosts: false,
            debounce_millis: default_debounce_millis(),
            max_name_suffix: default_max_name_suffix(),
            reverse_dns_fallback: false,
            fetch_error_policy: FetchErrorPolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
            debug: false,
        }
    }
}

/// Neighbor table watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Whether IPv6 neighbors are merged into client identities
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Refresh interval in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Output dialect of the neighbor command
    #[serde(default)]
    pub dialect: NeighborDialect,
}

impl NeighborConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.enabled && self.refresh_interval_secs == 0 {
            return Err(crate::Error::config(
                "Neighbor refresh interval must be > 0",
            ));
        }
        Ok(())
    }

    /// Refresh interval
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            refresh_interval_secs: default_refresh_interval_secs(),
            dialect: NeighborDialect::default(),
        }
    }
}

/// Which neighbor command (and output format) to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborDialect {
    /// `ip -6 neigh` on Linux, `ndp -an` elsewhere
    #[default]
    Auto,
    /// BSD `ndp -an`
    Ndp,
    /// Linux `ip -6 neigh show`
    IpNeigh,
}

impl NeighborDialect {
    /// Resolve `Auto` for the running platform
    pub fn resolve(self) -> NeighborDialect {
        match self {
            NeighborDialect::Auto if cfg!(target_os = "linux") => NeighborDialect::IpNeigh,
            NeighborDialect::Auto => NeighborDialect::Ndp,
            explicit => explicit,
        }
    }
}

impl std::str::FromStr for NeighborDialect {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(NeighborDialect::Auto),
            "ndp" => Ok(NeighborDialect::Ndp),
            "ip_neigh" | "ip" => Ok(NeighborDialect::IpNeigh),
            other => Err(crate::Error::config(format!(
                "Unknown neighbor dialect '{other}'. Supported: auto, ndp, ip-neigh"
            ))),
        }
    }
}

fn default_registry_url() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_debounce_millis() -> u64 {
    2000
}

fn default_max_name_suffix() -> usize {
    10
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_enabled() -> bool {
    true
}

fn default_refresh_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_format_follows_path() {
        assert_eq!(
            LeaseFormat::Auto.resolve(Path::new("/var/db/dnsmasq.leases")),
            LeaseFormat::Dnsmasq
        );
        assert_eq!(
            LeaseFormat::Auto.resolve(Path::new("/var/dhcpd/var/db/dhcpd.leases")),
            LeaseFormat::Isc
        );
        assert_eq!(
            LeaseFormat::Isc.resolve(Path::new("/var/db/dnsmasq.leases")),
            LeaseFormat::Isc
        );
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config = SyncConfig::new("/var/dhcpd/var/db/dhcpd.leases");
        assert_eq!(config.engine.debounce(), Duration::from_secs(2));
        assert_eq!(config.engine.max_name_suffix, 10);
        assert_eq!(config.neighbors.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.engine.fetch_error_policy, FetchErrorPolicy::Abort);
        assert!(!config.engine.dry_run);
        assert!(!config.engine.preserve_deleted_hosts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = SyncConfig::new("/tmp/dhcpd.leases");
        config.registry.scheme = "ftp".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::new("/tmp/dhcpd.leases");
        config.registry.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::new("/tmp/dhcpd.leases");
        config.leases.clear();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::new("/tmp/dhcpd.leases");
        config.neighbors.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
        config.neighbors.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_url_applies_scheme_only_when_missing() {
        let mut registry = RegistryConfig::default();
        assert_eq!(registry.base_url(), "http://127.0.0.1:3000");

        registry.url = "https://adguard.lan/".to_string();
        assert_eq!(registry.base_url(), "https://adguard.lan");

        registry.url = "10.0.0.1:8080".to_string();
        registry.scheme = "https".to_string();
        assert_eq!(registry.base_url(), "https://10.0.0.1:8080");
    }

    #[test]
    fn registry_debug_hides_password() {
        let registry = RegistryConfig {
            password: "hunter2".to_string(),
            ..RegistryConfig::default()
        };
        assert!(!format!("{registry:?}").contains("hunter2"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "leases": [{ "path": "/var/db/dnsmasq.leases" }],
            "engine": { "dry_run": true, "fetch_error_policy": "treat_as_empty" }
        }))
        .unwrap();

        assert_eq!(config.leases[0].format, LeaseFormat::Auto);
        assert!(config.engine.dry_run);
        assert_eq!(config.engine.fetch_error_policy, FetchErrorPolicy::TreatAsEmpty);
        assert_eq!(config.engine.debounce_millis, 2000);
        assert_eq!(config.registry.timeout_secs, 10);
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("dnsmasq".parse::<LeaseFormat>().unwrap(), LeaseFormat::Dnsmasq);
        assert_eq!(
            "treat-as-empty".parse::<FetchErrorPolicy>().unwrap(),
            FetchErrorPolicy::TreatAsEmpty
        );
        assert_eq!("ip-neigh".parse::<NeighborDialect>().unwrap(), NeighborDialect::IpNeigh);
        assert!("xml".parse::<LeaseFormat>().is_err());
    }
}
