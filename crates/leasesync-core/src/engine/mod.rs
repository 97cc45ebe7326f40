//! Core reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Reading DHCP leases and the IPv6 neighbor table
//! - Diffing them against the remote client registry
//! - Adding, updating and removing registry clients
//! - Re-running the diff whenever a lease file or the neighbor table changes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐
//! │ LeaseSource  │   │ NeighborWatcher  │
//! │ (+ notify)   │   │ (periodic probe) │
//! └──────────────┘   └──────────────────┘
//!        │ debounced change     │ snapshot changed
//!        └──────────┬───────────┘
//!                   ▼
//!        ┌─────────────────────┐
//!        │ pass queue (cap. 1) │
//!        └─────────────────────┘
//!                   │
//!                   ▼
//!          ┌────────────────┐        ┌────────────────┐
//!          │  pass worker   │───────▶│ ClientRegistry │
//!          │  (reconcile)   │        └────────────────┘
//!          └────────────────┘
//!                   │
//!                   ▼
//!               EngineEvent
//! ```
//!
//! ## Pass Flow
//!
//! 1. List registry clients (abort or treat as empty on failure, per config)
//! 2. Read merged leases (skip the pass if no lease file is readable)
//! 3. Plan per-device actions ([`reconcile::plan`])
//! 4. Execute adds (with name-suffix retry) and updates
//! 5. Remove clients whose MAC no longer has an active lease

mod debounce;
pub mod reconcile;

pub use reconcile::{ActionKind, Plan, PlanOptions, ReconciliationAction};

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, FetchErrorPolicy, NeighborConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::mac::MacAddress;
use crate::neighbor::{NeighborWatcher, SnapshotStream};
use crate::traits::{ClientRegistry, HostnameResolver, LeaseMap, LeaseSource, NeighborProbe, RemoteClient};

/// Counts of what one pass did
///
/// In dry-run mode the counts describe what the pass would have done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub unchanged: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PassSummary {
    /// Number of registry mutations (performed or, in dry-run, planned)
    pub fn mutations(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unchanged, {} added, {} updated, {} removed, {} failed, {} skipped",
            self.unchanged, self.added, self.updated, self.removed, self.failed, self.skipped
        )
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        lease_files: usize,
        neighbors_enabled: bool,
    },

    /// A reconciliation pass began
    PassStarted,

    /// A client was created in the registry
    ClientAdded { mac: MacAddress, name: String },

    /// A client's identifiers were replaced
    ClientUpdated {
        mac: MacAddress,
        name: String,
        reason: String,
    },

    /// A client with no active lease was deleted
    ClientRemoved { name: String },

    /// A registry mutation failed
    ClientFailed {
        name: String,
        operation: &'static str,
        error: String,
    },

    /// A pass finished
    PassCompleted { summary: PassSummary },

    /// A pass was abandoned before planning (no leases, registry unreachable)
    PassSkipped { reason: String },

    /// Engine stopped
    Stopped { reason: String },
}

struct Running {
    shutdown: watch::Sender<bool>,
    trigger: mpsc::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`], optionally attaching a neighbor
///    probe and a hostname resolver
/// 2. Wrap in an `Arc` and call [`SyncEngine::start()`]
/// 3. Call [`SyncEngine::stop()`] to shut down cooperatively
///
/// [`SyncEngine::reconcile()`] runs a single pass and can be used without
/// starting the engine (one-shot sync).
///
/// ## Serialization
///
/// Every trigger goes through a capacity-1 queue read by one pass worker,
/// so a burst of triggers while a pass runs collapses into one follow-up
/// pass. `reconcile()` also holds an async mutex for the whole pass, so a
/// direct call never overlaps the worker.
pub struct SyncEngine {
    leases: Box<dyn LeaseSource>,
    registry: Box<dyn ClientRegistry>,
    neighbors: Option<Arc<NeighborWatcher>>,
    resolver: Option<Box<dyn HostnameResolver>>,
    config: EngineConfig,
    neighbor_config: NeighborConfig,
    pass_lock: Mutex<()>,
    running: Mutex<Option<Running>>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `leases`: Lease source (usually a [`crate::lease::MultiLeaseSource`])
    /// - `registry`: Remote client registry
    /// - `config`: Full configuration (validated here)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        leases: Box<dyn LeaseSource>,
        registry: Box<dyn ClientRegistry>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            leases,
            registry,
            neighbors: None,
            resolver: None,
            config: config.engine.clone(),
            neighbor_config: config.neighbors.clone(),
            pass_lock: Mutex::new(()),
            running: Mutex::new(None),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Merge IPv6 neighbors from `probe` into client identities
    ///
    /// Ignored when neighbors are disabled in the configuration.
    pub fn with_neighbor_probe(mut self, probe: Arc<dyn NeighborProbe>) -> Self {
        if self.neighbor_config.enabled {
            self.neighbors = Some(Arc::new(NeighborWatcher::new(
                probe,
                &self.neighbor_config,
                self.config.debug,
            )));
        } else {
            info!("IPv6 neighbor tracking disabled");
        }
        self
    }

    /// Resolve missing hostnames of new leases with `resolver`
    ///
    /// Only consulted when `reverse_dns_fallback` is enabled.
    pub fn with_resolver(mut self, resolver: Box<dyn HostnameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The neighbor watcher, if neighbor tracking is enabled
    pub fn neighbors(&self) -> Option<&Arc<NeighborWatcher>> {
        self.neighbors.as_ref()
    }

    /// Start watching lease files and the neighbor table
    ///
    /// Probes the neighbor table once, then queues the startup pass.
    /// Starting a running engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::Watch` if the file watcher cannot be created.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Engine already running");
            return Ok(());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (trigger, requests) = mpsc::channel(1);
        let mut tasks = Vec::new();

        tasks.push(debounce::spawn_lease_watch(
            &self.leases.watched_paths(),
            self.config.debounce(),
            trigger.clone(),
            shutdown_rx.clone(),
        )?);

        if let Some(neighbors) = &self.neighbors {
            if let Err(e) = neighbors.refresh().await {
                warn!("Initial neighbor probe failed: {}", e);
            }
            tasks.push(spawn_neighbor_forwarder(
                neighbors.subscribe(),
                trigger.clone(),
                shutdown_rx.clone(),
            ));
            neighbors.start().await;
        }

        info!(
            "Engine started (registry={}, lease files={}, dry_run={})",
            self.registry.registry_name(),
            self.leases.watched_paths().len(),
            self.config.dry_run
        );
        self.emit_event(EngineEvent::Started {
            lease_files: self.leases.watched_paths().len(),
            neighbors_enabled: self.neighbors.is_some(),
        });

        tasks.push(self.spawn_pass_worker(requests, shutdown_rx));
        request_pass(&trigger);

        *running = Some(Running {
            shutdown,
            trigger,
            tasks,
        });

        Ok(())
    }

    /// Queue a pass on the running engine
    ///
    /// Returns `false` if the engine is not running. A request made while
    /// one is already queued is merged into it.
    pub async fn request_reconcile(&self) -> bool {
        match self.running.lock().await.as_ref() {
            Some(running) => {
                request_pass(&running.trigger);
                true
            }
            None => false,
        }
    }

    /// Stop all background tasks and wait for them
    ///
    /// A pass that is already executing runs to completion first.
    pub async fn stop(&self, reason: &str) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        info!("Stopping engine: {}", reason);
        let _ = running.shutdown.send(true);
        if let Some(neighbors) = &self.neighbors {
            neighbors.stop().await;
        }
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!("Engine task ended abnormally: {}", e);
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("Engine stopped");
    }

    /// Start, wait for `shutdown_rx`, then stop
    ///
    /// The daemon feeds this from SIGINT/SIGTERM; tests use it for a
    /// controlled shutdown.
    pub async fn run_with_shutdown(self: &Arc<Self>, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.start().await?;
        let _ = shutdown_rx.await;
        self.stop("Shutdown signal").await;
        Ok(())
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    ///
    /// - `Ok(PassSummary)`: The pass ran; individual device failures are
    ///   counted in `failed`, not returned
    /// - `Err(Error::LeaseRead)`: No lease file could be read; nothing was changed
    /// - `Err(Error::RegistryFetch)`: Listing clients failed and the fetch
    ///   policy is `abort`; nothing was changed
    pub async fn reconcile(&self) -> Result<PassSummary> {
        let _pass = self.pass_lock.lock().await;
        self.emit_event(EngineEvent::PassStarted);

        let clients = match self.registry.list_clients().await {
            Ok(clients) => clients,
            Err(e) => match self.config.fetch_error_policy {
                FetchErrorPolicy::Abort => {
                    error!(
                        "Failed to list {} clients, skipping pass: {}",
                        self.registry.registry_name(),
                        e
                    );
                    self.emit_event(EngineEvent::PassSkipped {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
                FetchErrorPolicy::TreatAsEmpty => {
                    warn!(
                        "Failed to list {} clients, treating registry as empty: {}",
                        self.registry.registry_name(),
                        e
                    );
                    Vec::new()
                }
            },
        };
        debug!("Registry has {} clients", clients.len());

        let mut leases = match self.leases.leases().await {
            Ok(leases) => leases,
            Err(e) => {
                error!("No lease data available, skipping pass: {}", e);
                self.emit_event(EngineEvent::PassSkipped {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let neighbors = self
            .neighbors
            .as_ref()
            .map(|n| n.table())
            .unwrap_or_default();

        self.fill_missing_hostnames(&mut leases, &clients).await;

        let plan = reconcile::plan(
            &leases,
            &clients,
            &neighbors,
            PlanOptions {
                max_name_suffix: self.config.max_name_suffix,
            },
        );

        let mut summary = PassSummary::default();

        for skipped in &plan.skipped {
            warn!("{}, skipping", skipped);
            summary.skipped += 1;
        }

        for action in &plan.actions {
            self.apply(action, &mut summary).await;
        }

        self.remove_stale(&plan.stale, &mut summary).await;

        info!("Reconciliation pass complete: {}", summary);
        self.emit_event(EngineEvent::PassCompleted { summary });

        Ok(summary)
    }

    async fn fill_missing_hostnames(&self, leases: &mut LeaseMap, clients: &[RemoteClient]) {
        if !self.config.reverse_dns_fallback {
            return;
        }
        let Some(resolver) = &self.resolver else {
            return;
        };

        let known: HashSet<MacAddress> = clients.iter().filter_map(RemoteClient::mac).collect();
        for lease in leases
            .values_mut()
            .filter(|l| l.is_active && l.hostname.is_none() && !known.contains(&l.mac))
        {
            match resolver.reverse_lookup(lease.ip).await {
                Ok(Some(name)) => {
                    debug!("Resolved {} ({}) to '{}'", lease.mac, lease.ip, name);
                    lease.hostname = Some(name);
                }
                Ok(None) => debug!("No reverse DNS name for {}", lease.ip),
                Err(e) => warn!("Reverse lookup for {} failed: {}", lease.ip, e),
            }
        }
    }

    async fn apply(&self, action: &ReconciliationAction, summary: &mut PassSummary) {
        match action.kind {
            ActionKind::NoUpdate => {
                if self.config.debug {
                    debug!("{} ({}) is up to date", action.hostname, action.mac);
                }
                summary.unchanged += 1;
            }
            ActionKind::Add => match self.add_client(action).await {
                Ok(Some(name)) => {
                    summary.added += 1;
                    self.emit_event(EngineEvent::ClientAdded {
                        mac: action.mac,
                        name,
                    });
                }
                Ok(None) => summary.added += 1,
                Err(e) => {
                    error!("Failed to add client {} ({}): {}", action.hostname, action.mac, e);
                    summary.failed += 1;
                    self.emit_event(EngineEvent::ClientFailed {
                        name: action.hostname.clone(),
                        operation: "create",
                        error: e.to_string(),
                    });
                }
            },
            ActionKind::Update => {
                let current = action.current_name.as_deref().unwrap_or(&action.hostname);
                match self.update_client(current, action).await {
                    Ok(true) => {
                        summary.updated += 1;
                        self.emit_event(EngineEvent::ClientUpdated {
                            mac: action.mac,
                            name: action.hostname.clone(),
                            reason: action.reason.clone(),
                        });
                    }
                    Ok(false) => summary.updated += 1,
                    Err(e) => {
                        error!("Failed to update client {} ({}): {}", current, action.mac, e);
                        summary.failed += 1;
                        self.emit_event(EngineEvent::ClientFailed {
                            name: current.to_string(),
                            operation: "update",
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Create a client, walking the name candidates on conflict
    ///
    /// Returns the name actually used, or `None` in dry-run mode.
    async fn add_client(&self, action: &ReconciliationAction) -> Result<Option<String>> {
        if self.config.dry_run {
            let ids: Vec<String> = std::iter::once(action.mac.to_string())
                .chain(action.wanted.iter().cloned())
                .collect();
            info!(
                "[DRY RUN] Would add client {}: {}",
                action.mac,
                serde_json::json!({ "name": action.hostname, "ids": ids })
            );
            return Ok(None);
        }

        info!("Adding client {} ({}): {}", action.hostname, action.mac, action.reason);

        let mut last_conflict = None;
        for name in reconcile::name_candidates(&action.hostname, self.config.max_name_suffix) {
            match self
                .registry
                .create_client(&name, &action.mac, &action.wanted)
                .await
            {
                Ok(()) => {
                    info!("Added client {} ({})", name, action.mac);
                    return Ok(Some(name));
                }
                Err(e) if e.is_name_conflict() => {
                    debug!("Name '{}' is taken, trying the next candidate", name);
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_conflict.unwrap_or_else(|| Error::name_conflict(action.hostname.as_str())))
    }

    /// Replace a client's identifiers; returns `false` in dry-run mode
    async fn update_client(&self, current: &str, action: &ReconciliationAction) -> Result<bool> {
        let client = action.updated_client();

        if self.config.dry_run {
            info!(
                "[DRY RUN] Would update client {} ({}, {}): {}",
                current,
                action.mac,
                action.reason,
                serde_json::json!({ "name": current, "data": { "name": client.name, "ids": client.ids } })
            );
            return Ok(false);
        }

        info!("Updating client {} ({}): {}", current, action.mac, action.reason);
        self.registry.update_client(current, &client).await?;
        Ok(true)
    }

    async fn remove_stale(&self, stale: &[RemoteClient], summary: &mut PassSummary) {
        for client in stale {
            if self.config.preserve_deleted_hosts {
                debug!("Preserving client {} with no active lease", client.name);
                continue;
            }

            if self.config.dry_run {
                info!("[DRY RUN] Would remove client {} (no active lease)", client.name);
                summary.removed += 1;
                continue;
            }

            match self.registry.delete_client(&client.name).await {
                Ok(()) => {
                    info!("Removed client {} (no active lease)", client.name);
                    summary.removed += 1;
                    self.emit_event(EngineEvent::ClientRemoved {
                        name: client.name.clone(),
                    });
                }
                Err(e) => {
                    error!("Failed to remove client {}: {}", client.name, e);
                    summary.failed += 1;
                    self.emit_event(EngineEvent::ClientFailed {
                        name: client.name.clone(),
                        operation: "delete",
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn spawn_pass_worker(
        self: &Arc<Self>,
        mut requests: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    request = requests.recv() => {
                        if request.is_none() {
                            break;
                        }
                        let Some(engine) = engine.upgrade() else { break };
                        // reconcile() already logged why the pass was skipped
                        if let Err(e) = engine.reconcile().await {
                            debug!("Queued pass did not complete: {}", e);
                        }
                    }
                }
            }
            debug!("Pass worker stopped");
        })
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Queue a pass unless one is already waiting
pub(crate) fn request_pass(trigger: &mpsc::Sender<()>) {
    match trigger.try_send(()) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(())) => {
            debug!("Reconciliation already queued, merging request");
        }
        Err(mpsc::error::TrySendError::Closed(())) => {
            debug!("Pass worker stopped, dropping request");
        }
    }
}

fn spawn_neighbor_forwarder(
    mut updates: SnapshotStream,
    trigger: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                update = updates.next() => match update {
                    Some(snapshot) => {
                        info!(
                            "Neighbor table changed ({} devices), requesting reconciliation",
                            snapshot.len()
                        );
                        request_pass(&trigger);
                    }
                    None => break,
                },
            }
        }
    })
}
