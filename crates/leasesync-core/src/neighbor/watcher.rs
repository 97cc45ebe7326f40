// # Neighbor Table Watcher
//
// Periodically samples the neighbor table through a `NeighborProbe`, keeps
// the most recent snapshot and pushes changed snapshots to subscribers.
//
// - The current snapshot lives in a `watch` channel so `table()` never
//   blocks and always returns a complete snapshot.
// - Subscribers get bounded channels, served in subscription order with
//   `try_send`. A slow subscriber loses that snapshot (logged) rather than
//   stalling the refresh loop; the next change brings it up to date.
// - A failed probe keeps the previous snapshot.

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::NeighborConfig;
use crate::error::Result;
use crate::mac::MacAddress;
use crate::neighbor::NeighborSnapshot;
use crate::traits::NeighborProbe;

/// Buffered snapshots per subscriber
const SUBSCRIBER_CAPACITY: usize = 4;

/// Stream of published snapshots
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Arc<NeighborSnapshot>> + Send + 'static>>;

struct RefreshTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic neighbor table sampler
pub struct NeighborWatcher {
    probe: Arc<dyn NeighborProbe>,
    interval: Duration,
    debug: bool,
    current: watch::Sender<Arc<NeighborSnapshot>>,
    subscribers: StdMutex<Vec<mpsc::Sender<Arc<NeighborSnapshot>>>>,
    // Serializes probe + compare + replace
    refresh_lock: Mutex<()>,
    task: Mutex<Option<RefreshTask>>,
}

impl NeighborWatcher {
    /// Create a watcher with an empty snapshot
    pub fn new(probe: Arc<dyn NeighborProbe>, config: &NeighborConfig, debug: bool) -> Self {
        let (current, _) = watch::channel(Arc::new(NeighborSnapshot::default()));
        Self {
            probe,
            interval: config.refresh_interval(),
            debug,
            current,
            subscribers: StdMutex::new(Vec::new()),
            refresh_lock: Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    /// The most recent snapshot
    pub fn table(&self) -> Arc<NeighborSnapshot> {
        self.current.borrow().clone()
    }

    /// IPv6 addresses currently associated with `mac`
    pub fn addresses_for(&self, mac: &MacAddress) -> Vec<String> {
        self.current.borrow().addresses_for(mac).to_vec()
    }

    /// Subscribe to changed snapshots
    ///
    /// The stream ends when the watcher is dropped.
    pub fn subscribe(&self) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.lock_subscribers().push(tx);
        Box::pin(ReceiverStream::new(rx))
    }

    /// Probe once now
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The table changed and was published
    /// - `Ok(false)`: The table is unchanged
    /// - `Err(Error::NeighborProbe)`: The probe failed; the previous snapshot is kept
    pub async fn refresh(&self) -> Result<bool> {
        let _guard = self.refresh_lock.lock().await;

        let table = match self.probe.probe().await {
            Ok(table) => table,
            Err(e) => {
                if self.debug {
                    error!("Neighbor probe {} failed: {}", self.probe.probe_name(), e);
                } else {
                    debug!("Neighbor probe {} failed: {}", self.probe.probe_name(), e);
                }
                return Err(e);
            }
        };

        if !self.current.borrow().differs_from(&table) {
            debug!("Neighbor table unchanged ({} devices)", table.len());
            return Ok(false);
        }

        let snapshot = Arc::new(NeighborSnapshot::new(table));
        info!("Neighbor table changed: {} devices", snapshot.len());
        if self.debug {
            for (mac, addrs) in snapshot.iter() {
                debug!("Neighbor {} -> {:?}", mac, addrs);
            }
        }

        self.current.send_replace(snapshot.clone());
        self.publish(&snapshot);
        Ok(true)
    }

    /// Start periodic refresh
    ///
    /// The first refresh happens one interval from now; call [`refresh`]
    /// beforehand for an immediate sample. Starting twice is a no-op.
    ///
    /// [`refresh`]: NeighborWatcher::refresh
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Neighbor watcher already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let watcher: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            info!("Starting neighbor table refresh (interval={:?})", period);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let Some(watcher) = watcher.upgrade() else { break };
                        // Failures are already logged by refresh()
                        let _ = watcher.refresh().await;
                    }
                }
            }
            debug!("Neighbor table refresh stopped");
        });

        *task = Some(RefreshTask { shutdown, handle });
    }

    /// Stop periodic refresh and wait for the loop to exit
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            warn!("Neighbor refresh task ended abnormally: {}", e);
        }
    }

    fn publish(&self, snapshot: &Arc<NeighborSnapshot>) {
        self.lock_subscribers().retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Neighbor subscriber is lagging, dropping snapshot");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<Arc<NeighborSnapshot>>>> {
        // A poisoned list is still a valid list of senders
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
