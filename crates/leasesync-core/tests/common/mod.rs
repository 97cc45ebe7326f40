//! Test doubles and common utilities for engine contract tests
//!
//! These doubles keep their state behind `Arc`s so a test can hand one copy
//! to the engine and keep another (`sharing_counters_with`) for assertions.

#![allow(dead_code)]

use leasesync_core::config::SyncConfig;
use leasesync_core::error::{Error, Result};
use leasesync_core::traits::{
    ClientRegistry, Lease, LeaseMap, LeaseSource, NeighborProbe, NeighborTable, RemoteClient,
};
use leasesync_core::traits::HostnameResolver;
use leasesync_core::{EngineEvent, MacAddress, SyncEngine};
use std::net::IpAddr;
use tokio::sync::mpsc;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A registry call, as recorded by [`MockRegistry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create { name: String, ids: Vec<String> },
    Update { current_name: String, client_name: String, ids: Vec<String> },
    Delete { name: String },
}

/// In-memory ClientRegistry that records every call
pub struct MockRegistry {
    clients: Arc<Mutex<Vec<RemoteClient>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    /// Names that always answer with a name conflict
    taken: Arc<Mutex<HashSet<String>>>,
    /// Names whose create or delete fails with a non-conflict error
    broken: Arc<Mutex<HashSet<String>>>,
    fail_list: Arc<AtomicBool>,
    list_delay: Arc<Mutex<Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::with_clients(Vec::new())
    }

    pub fn with_clients(clients: Vec<RemoteClient>) -> Self {
        Self {
            clients: Arc::new(Mutex::new(clients)),
            calls: Arc::new(Mutex::new(Vec::new())),
            taken: Arc::new(Mutex::new(HashSet::new())),
            broken: Arc::new(Mutex::new(HashSet::new())),
            fail_list: Arc::new(AtomicBool::new(false)),
            list_delay: Arc::new(Mutex::new(Duration::ZERO)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a new MockRegistry that shares all state with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            clients: Arc::clone(&other.clients),
            calls: Arc::clone(&other.calls),
            taken: Arc::clone(&other.taken),
            broken: Arc::clone(&other.broken),
            fail_list: Arc::clone(&other.fail_list),
            list_delay: Arc::clone(&other.list_delay),
            in_flight: Arc::clone(&other.in_flight),
            max_in_flight: Arc::clone(&other.max_in_flight),
        }
    }

    /// Make `name` answer every create (and every rename to it) with a name conflict
    pub fn take_name(&self, name: &str) {
        self.taken.lock().unwrap().insert(name.to_string());
    }

    /// Make creates and deletes of `name` fail with a server error
    pub fn break_name(&self, name: &str) {
        self.broken.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Hold every list call for `delay`, to widen pass overlap windows
    pub fn delay_list(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn clients(&self) -> Vec<RemoteClient> {
        self.clients.lock().unwrap().clone()
    }

    pub fn client(&self, name: &str) -> Option<RemoteClient> {
        self.clients().into_iter().find(|c| c.name == name)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn list_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::List)).count()
    }

    /// Create, update and delete calls
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    pub fn create_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Highest number of list calls ever in progress at once
    pub fn max_concurrent_lists(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ClientRegistry for MockRegistry {
    async fn list_clients(&self) -> Result<Vec<RemoteClient>> {
        self.record(Call::List);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::registry_fetch("connection refused"));
        }
        Ok(self.clients())
    }

    async fn create_client(
        &self,
        name: &str,
        mac: &MacAddress,
        ids: &BTreeSet<String>,
    ) -> Result<()> {
        let mut all_ids = vec![mac.to_string()];
        all_ids.extend(ids.iter().cloned());
        self.record(Call::Create {
            name: name.to_string(),
            ids: all_ids.clone(),
        });

        if self.broken.lock().unwrap().contains(name) {
            return Err(Error::mutation("create", name, "HTTP 500"));
        }
        let mut clients = self.clients.lock().unwrap();
        if self.taken.lock().unwrap().contains(name) || clients.iter().any(|c| c.name == name) {
            return Err(Error::name_conflict(name));
        }
        clients.push(RemoteClient::new(name, all_ids));
        Ok(())
    }

    async fn update_client(&self, current_name: &str, client: &RemoteClient) -> Result<()> {
        self.record(Call::Update {
            current_name: current_name.to_string(),
            client_name: client.name.clone(),
            ids: client.ids.clone(),
        });

        if client.name != current_name && self.taken.lock().unwrap().contains(&client.name) {
            return Err(Error::name_conflict(client.name.as_str()));
        }
        let mut clients = self.clients.lock().unwrap();
        match clients.iter_mut().find(|c| c.name == current_name) {
            Some(existing) => {
                *existing = client.clone();
                Ok(())
            }
            None => Err(Error::mutation("update", current_name, "client not found")),
        }
    }

    async fn delete_client(&self, name: &str) -> Result<()> {
        self.record(Call::Delete {
            name: name.to_string(),
        });

        if self.broken.lock().unwrap().contains(name) {
            return Err(Error::mutation("delete", name, "HTTP 500"));
        }
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|c| c.name != name);
        if clients.len() == before {
            return Err(Error::mutation("delete", name, "client not found"));
        }
        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        "mock"
    }
}

/// A lease source whose contents the test sets directly
pub struct StaticLeaseSource {
    path: PathBuf,
    leases: Arc<Mutex<LeaseMap>>,
    unreadable: Arc<AtomicBool>,
    read_count: Arc<AtomicUsize>,
}

impl StaticLeaseSource {
    pub fn new(path: impl Into<PathBuf>, leases: Vec<Lease>) -> Self {
        Self {
            path: path.into(),
            leases: Arc::new(Mutex::new(to_map(leases))),
            unreadable: Arc::new(AtomicBool::new(false)),
            read_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            path: other.path.clone(),
            leases: Arc::clone(&other.leases),
            unreadable: Arc::clone(&other.unreadable),
            read_count: Arc::clone(&other.read_count),
        }
    }

    pub fn set_leases(&self, leases: Vec<Lease>) {
        *self.leases.lock().unwrap() = to_map(leases);
    }

    /// Make every read fail as if no lease file existed
    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LeaseSource for StaticLeaseSource {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn leases(&self) -> Result<LeaseMap> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(Error::lease_read(
                self.path.display().to_string(),
                "no lease file exists",
            ));
        }
        Ok(self.leases.lock().unwrap().clone())
    }
}

/// A neighbor probe returning whatever table the test last set
#[derive(Clone)]
pub struct ScriptedProbe {
    table: Arc<Mutex<NeighborTable>>,
    probe_count: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(NeighborTable::new())),
            probe_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, rows: &[(&str, &[&str])]) {
        *self.table.lock().unwrap() = rows
            .iter()
            .map(|(m, addrs)| (mac(m), addrs.iter().map(|a| a.to_string()).collect()))
            .collect();
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NeighborProbe for ScriptedProbe {
    async fn probe(&self) -> Result<NeighborTable> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.lock().unwrap().clone())
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn mac(s: &str) -> MacAddress {
    MacAddress::parse(s).expect("valid MAC in test")
}

pub fn lease(mac_str: &str, ip: &str, hostname: Option<&str>) -> Lease {
    Lease::new(mac(mac_str), ip.parse().expect("valid IP in test"), hostname)
}

fn to_map(leases: Vec<Lease>) -> LeaseMap {
    leases.into_iter().map(|l| (l.mac, l)).collect()
}

/// Helper to create a minimal SyncConfig for testing
///
/// Neighbor tracking is off; tests that need it turn it back on.
pub fn minimal_config(lease_path: impl AsRef<Path>) -> SyncConfig {
    let mut config = SyncConfig::new(lease_path.as_ref());
    config.neighbors.enabled = false;
    config.engine.debounce_millis = 100;
    config
}

/// Poll `check` every 10ms until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// A resolver that answers every lookup with the same name
pub struct FixedResolver {
    name: Option<String>,
    lookups: Arc<AtomicUsize>,
}

impl FixedResolver {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            name: other.name.clone(),
            lookups: Arc::clone(&other.lookups),
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HostnameResolver for FixedResolver {
    async fn reverse_lookup(&self, _ip: IpAddr) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.name.clone())
    }
}

/// Build an engine over doubles that share state with the test's copies
pub fn build_engine(
    registry: &MockRegistry,
    leases: &StaticLeaseSource,
    config: &SyncConfig,
) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
    SyncEngine::new(
        Box::new(StaticLeaseSource::sharing_counters_with(leases)),
        Box::new(MockRegistry::sharing_counters_with(registry)),
        config,
    )
    .expect("engine construction succeeds")
}

/// Collect every event currently buffered
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub const LAPTOP_MAC: &str = "aa:bb:cc:dd:ee:ff";
