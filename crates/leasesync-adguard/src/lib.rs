// # AdGuard Home Client Registry
//
// `ClientRegistry` implementation over the AdGuard Home control API.
//
// Every trait method is one HTTP request. There is no retry, no caching and
// no background work here; the engine decides what to call and when, and it
// relies on name collisions coming back as `Error::NameConflict`.
//
// ## API Reference
//
// - List clients:   GET    `/control/clients` -> `{"clients": [...]}`
// - Add client:     POST   `/control/clients/add` with the client object
// - Update client:  PUT    `/control/clients/update` with `{"name", "data"}`
// - Delete client:  DELETE `/control/clients/delete` with `{"name"}`
//
// ## Security
//
// - The password never appears in logs or `Debug` output
// - Credentials are sent as HTTP basic auth, only when a username is set

use async_trait::async_trait;
use leasesync_core::config::RegistryConfig;
use leasesync_core::{ClientRegistry, Error, MacAddress, RemoteClient, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

const CLIENTS_PATH: &str = "/control/clients";
const ADD_PATH: &str = "/control/clients/add";
const UPDATE_PATH: &str = "/control/clients/update";
const DELETE_PATH: &str = "/control/clients/delete";

/// Response body of `GET /control/clients`
///
/// AdGuard answers `"clients": null` when none are configured.
#[derive(Debug, Deserialize)]
struct ClientList {
    #[serde(default)]
    clients: Option<Vec<WireClient>>,
}

/// A persistent client as AdGuard serializes it
///
/// Everything besides `name` and `ids` is kept in `settings` so an update
/// can send it back unchanged.
#[derive(Debug, Deserialize)]
struct WireClient {
    name: String,
    #[serde(default)]
    ids: Option<Vec<String>>,
    #[serde(flatten)]
    settings: Map<String, Value>,
}

impl From<WireClient> for RemoteClient {
    fn from(wire: WireClient) -> Self {
        RemoteClient {
            name: wire.name,
            ids: wire.ids.unwrap_or_default(),
            settings: wire.settings,
        }
    }
}

/// AdGuard Home client registry
///
/// Built once from [`RegistryConfig`]; holds a `reqwest::Client` configured
/// with the per-request timeout.
pub struct AdGuardRegistry {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AdGuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdGuardRegistry")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl AdGuardRegistry {
    /// Create a registry client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    /// Send a mutation and map any failure onto the engine's error classes
    async fn mutate(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        name: &str,
        body: &Value,
    ) -> Result<()> {
        tracing::debug!("AdGuard {} '{}': {} {}", operation, name, method, path);

        let response = self
            .send(method, path, Some(body))
            .await
            .map_err(|e| Error::mutation(operation, name, format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(classify_mutation_error(operation, name, status, &text))
    }
}

/// Map a failed mutation response to an error
///
/// AdGuard reports a taken name as a 400 with a plain-text reason; only that
/// case becomes `NameConflict`.
fn classify_mutation_error(
    operation: &'static str,
    name: &str,
    status: StatusCode,
    body: &str,
) -> Error {
    let body = body.trim();
    match status.as_u16() {
        400 if is_name_taken(body) => Error::name_conflict(name),
        401 | 403 => Error::auth(format!(
            "AdGuard rejected the credentials (status {status})"
        )),
        _ => Error::mutation(operation, name, format!("HTTP {status}: {body}")),
    }
}

fn is_name_taken(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("uses the same name") || body.contains("already exists")
}

/// Body for `POST /control/clients/add`
fn add_payload(name: &str, mac: &MacAddress, ids: &BTreeSet<String>) -> Value {
    let mut all_ids = vec![mac.to_string()];
    all_ids.extend(ids.iter().cloned());
    json!({
        "name": name,
        "ids": all_ids,
        "use_global_settings": true,
        "filtering_enabled": true,
        "parental_enabled": false,
        "safebrowsing_enabled": false,
        "safesearch_enabled": false,
    })
}

/// Body for `PUT /control/clients/update`
///
/// The existing settings go out verbatim; `name` and `ids` are overlaid.
fn update_payload(current_name: &str, client: &RemoteClient) -> Value {
    let mut data = client.settings.clone();
    data.insert("name".to_string(), Value::String(client.name.clone()));
    data.insert(
        "ids".to_string(),
        Value::Array(client.ids.iter().cloned().map(Value::String).collect()),
    );
    json!({
        "name": current_name,
        "data": data,
    })
}

#[async_trait]
impl ClientRegistry for AdGuardRegistry {
    async fn list_clients(&self) -> Result<Vec<RemoteClient>> {
        let response = self
            .send(Method::GET, CLIENTS_PATH, None)
            .await
            .map_err(|e| Error::registry_fetch(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!(
                    "AdGuard rejected the credentials (status {status})"
                )),
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    Error::registry_fetch(format!("HTTP {status}: {}", text.trim()))
                }
            });
        }

        let list: ClientList = response
            .json()
            .await
            .map_err(|e| Error::registry_fetch(format!("Failed to parse client list: {e}")))?;

        let clients: Vec<RemoteClient> = list
            .clients
            .unwrap_or_default()
            .into_iter()
            .map(RemoteClient::from)
            .collect();
        tracing::debug!("AdGuard returned {} clients", clients.len());
        Ok(clients)
    }

    async fn create_client(
        &self,
        name: &str,
        mac: &MacAddress,
        ids: &BTreeSet<String>,
    ) -> Result<()> {
        let body = add_payload(name, mac, ids);
        self.mutate("create", Method::POST, ADD_PATH, name, &body).await
    }

    async fn update_client(&self, current_name: &str, client: &RemoteClient) -> Result<()> {
        let body = update_payload(current_name, client);
        self.mutate("update", Method::PUT, UPDATE_PATH, current_name, &body)
            .await
    }

    async fn delete_client(&self, name: &str) -> Result<()> {
        let body = json!({ "name": name });
        self.mutate("delete", Method::DELETE, DELETE_PATH, name, &body)
            .await
    }

    fn registry_name(&self) -> &'static str {
        "adguard"
    }
}
