// # Client Registry Trait
//
// Defines the interface for the remote registry of named clients.
//
// ## Implementations
//
// - AdGuard Home: `leasesync-adguard` crate
//
// ## Usage
//
// ```rust,ignore
// use leasesync_core::ClientRegistry;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let registry = /* ClientRegistry implementation */;
//
//     for client in registry.list_clients().await? {
//         println!("{}: {:?}", client.name, client.ids);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::mac::MacAddress;

/// A client as stored by the remote registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteClient {
    /// Unique name; the only key for update and delete
    pub name: String,

    /// Identifiers (MAC, IPv4, IPv6, ...) as returned by the registry
    pub ids: Vec<String>,

    /// Registry-specific settings, carried through updates untouched
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl RemoteClient {
    /// Create a client with no extra settings
    pub fn new(name: impl Into<String>, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            ids: ids.into_iter().map(Into::into).collect(),
            settings: serde_json::Map::new(),
        }
    }

    /// The first identifier that parses as a MAC address
    pub fn mac(&self) -> Option<MacAddress> {
        self.ids.iter().find_map(|id| MacAddress::parse(id))
    }
}

/// Trait for remote registry implementations
///
/// Implementations are single-shot: one HTTP call per method, no retries.
/// Retry policy belongs to the engine, which needs name conflicts reported
/// as [`crate::Error::NameConflict`] to tell them apart from other failures.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// List every client known to the registry
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<RemoteClient>)`: All clients (empty if none)
    /// - `Err(Error::RegistryFetch)`: If the list could not be fetched
    async fn list_clients(&self) -> Result<Vec<RemoteClient>, crate::Error>;

    /// Create a client
    ///
    /// The MAC is passed separately from `ids`; implementations add it to
    /// the stored identifier list themselves.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Client created
    /// - `Err(Error::NameConflict)`: `name` is already taken
    /// - `Err(Error::RegistryMutation)`: Any other failure
    async fn create_client(
        &self,
        name: &str,
        mac: &MacAddress,
        ids: &BTreeSet<String>,
    ) -> Result<(), crate::Error>;

    /// Replace the client currently named `current_name` with `client`
    ///
    /// The identifier list is replaced wholesale, so `client.ids` must
    /// contain the MAC.
    async fn update_client(
        &self,
        current_name: &str,
        client: &RemoteClient,
    ) -> Result<(), crate::Error>;

    /// Delete the client named `name`
    async fn delete_client(&self, name: &str) -> Result<(), crate::Error>;

    /// Registry name (for logging)
    fn registry_name(&self) -> &'static str;
}
