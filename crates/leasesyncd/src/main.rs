// # leasesyncd - Lease Sync Daemon
//
// Thin integration layer: parses flags, builds the concrete lease reader,
// AdGuard registry and host probes, and hands them to `SyncEngine`.
// Reconciliation logic lives in leasesync-core.
//
// ## Commands
//
// - `leasesyncd sync`: one pass (neighbor table probed first), then exit
// - `leasesyncd serve`: run until SIGINT/SIGTERM
//
// ## Example
//
// ```bash
// export ADGUARD_URL=127.0.0.1:3000
// export ADGUARD_USERNAME=admin
// export ADGUARD_PASSWORD=secret
// export DHCP_LEASE_PATH=/var/dhcpd/var/db/dhcpd.leases
//
// leasesyncd serve
// ```

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use leasesync_adguard::AdGuardRegistry;
use leasesync_core::{EngineEvent, SyncConfig, SyncEngine, lease};
use leasesync_host::{GetentResolver, NdpProbe};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use cli::{Cli, Command};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown / successful pass
/// - 1: Configuration or startup error
/// - 2: Runtime error (failed pass, unexpected failure)
#[derive(Debug, Clone, Copy)]
enum LeasesyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<LeasesyncExitCode> for ExitCode {
    fn from(code: LeasesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.global.tracing_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return LeasesyncExitCode::ConfigError.into();
        }
    };

    let config = cli.global.to_config();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return LeasesyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return LeasesyncExitCode::ConfigError.into();
    }

    info!("Starting leasesyncd {}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return LeasesyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let (engine, events) = match build_engine(&config) {
            Ok(built) => built,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return LeasesyncExitCode::ConfigError;
            }
        };
        let event_log = tokio::spawn(log_events(events));

        let result = match cli.command {
            Command::Sync => run_sync(&engine).await,
            Command::Serve => run_serve(&engine).await,
        };

        // Dropping the engine closes the event channel
        drop(engine);
        let _ = event_log.await;

        match result {
            Ok(()) => LeasesyncExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                LeasesyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Wire the concrete components into an engine
fn build_engine(config: &SyncConfig) -> Result<(Arc<SyncEngine>, mpsc::Receiver<EngineEvent>)> {
    let leases = lease::open_all(&config.leases, config.engine.debug)
        .context("Failed to open lease files")?;
    let registry =
        AdGuardRegistry::new(&config.registry).context("Failed to create AdGuard client")?;

    info!(
        "Syncing {} lease file(s) into AdGuard Home at {}",
        config.leases.len(),
        registry.base_url()
    );
    if config.engine.dry_run {
        info!("Dry-run mode: no changes will be made to AdGuard Home");
    }

    let (engine, events) = SyncEngine::new(Box::new(leases), Box::new(registry), config)
        .context("Failed to create engine")?;
    let engine = engine
        .with_neighbor_probe(Arc::new(NdpProbe::new(config.neighbors.dialect)))
        .with_resolver(Box::new(GetentResolver::new()));

    Ok((Arc::new(engine), events))
}

/// One pass, with a fresh neighbor sample
async fn run_sync(engine: &Arc<SyncEngine>) -> Result<()> {
    if let Some(neighbors) = engine.neighbors()
        && let Err(e) = neighbors.refresh().await
    {
        info!("Continuing without IPv6 neighbors: {}", e);
    }

    let summary = engine.reconcile().await.context("Reconciliation pass failed")?;
    info!("Sync complete: {}", summary);
    Ok(())
}

/// Run the engine until a shutdown signal arrives
async fn run_serve(engine: &Arc<SyncEngine>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let result = engine.run_with_shutdown(shutdown_rx).await;
    signals.abort();
    result.context("Engine failed")?;

    info!("Shutdown complete");
    Ok(())
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
