// # Lease File Debouncer
//
// DHCP servers rewrite their lease file several times per client event
// (dhcpd writes a temp file and renames it over the old one). Each matching
// filesystem event re-arms a timer; a pass is requested only once the files
// have been quiet for the whole window.
//
// The parent directory of each lease file is watched instead of the file
// itself, since a rename replaces the inode a file watch would be bound to.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::engine::request_pass;
use crate::error::{Error, Result};

/// Watch `paths` and request a pass after each quiet period
///
/// The notify watcher lives inside the returned task and is dropped when
/// the task exits on shutdown.
pub(crate) fn spawn_lease_watch(
    paths: &[&Path],
    window: Duration,
    trigger: mpsc::Sender<()>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let targets = absolute_paths(paths)?;
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

    let dirs: BTreeSet<&Path> = targets.iter().filter_map(|p| p.parent()).collect();
    for dir in dirs {
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => info!("Watching {} for lease changes", dir.display()),
            Err(e) => error!("Cannot watch {}: {}", dir.display(), e),
        }
    }

    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        debounce_loop(event_rx, targets, window, trigger, shutdown).await;
    }))
}

fn absolute_paths(paths: &[&Path]) -> Result<HashSet<PathBuf>> {
    paths
        .iter()
        .map(|p| {
            std::path::absolute(p)
                .map_err(|e| Error::watch(format!("cannot resolve {}: {}", p.display(), e)))
        })
        .collect()
}

/// Whether `event` concerns one of the lease files
fn is_lease_change(event: &Event, targets: &HashSet<PathBuf>) -> bool {
    !matches!(event.kind, EventKind::Access(_))
        && event.paths.iter().any(|p| targets.contains(p))
}

pub(crate) async fn debounce_loop(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    targets: HashSet<PathBuf>,
    window: Duration,
    trigger: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let quiet = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Some(Ok(event)) if is_lease_change(&event, &targets) => {
                    debug!("Lease file event {:?} on {:?}", event.kind, event.paths);
                    deadline = Some(Instant::now() + window);
                }
                Some(Ok(event)) => trace!("Ignoring file event {:?} on {:?}", event.kind, event.paths),
                Some(Err(e)) => error!("File watcher error: {}", e),
                None => break,
            },
            _ = quiet => {
                deadline = None;
                info!("Lease file changed, requesting reconciliation");
                request_pass(&trigger);
            }
        }
    }

    debug!("Lease file watch stopped");
}
