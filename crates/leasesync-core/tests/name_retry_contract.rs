//! Architectural Contract Test: Name Conflict Retry
//!
//! This test verifies the bounded retry policy for new clients.
//!
//! Constraints verified:
//! - A name conflict on create is retried as `name-1` .. `name-10`
//! - At most 11 create attempts are made per device per pass
//! - Any other create error stops that device immediately
//! - Updates are attempted once, even on a name conflict
//! - A suffixed name survives later updates
//!
//! If this test fails, the engine either hammers the registry or gives
//! up on names it could have used.

mod common;

use common::*;
use leasesync_core::RemoteClient;

fn laptop_only() -> StaticLeaseSource {
    StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![lease(LAPTOP_MAC, "192.168.1.10", Some("laptop"))],
    )
}

#[tokio::test]
async fn conflict_is_retried_with_suffix() {
    let registry = MockRegistry::new();
    registry.take_name("laptop");
    let leases = laptop_only();
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let summary = engine.reconcile().await.expect("pass succeeds");

    assert_eq!(summary.added, 1);
    assert_eq!(registry.create_names(), ["laptop", "laptop-1"]);
    assert!(registry.client("laptop-1").is_some());
}

#[tokio::test]
async fn retries_stop_after_eleven_attempts() {
    let registry = MockRegistry::new();
    registry.take_name("laptop");
    for n in 1..=10 {
        registry.take_name(&format!("laptop-{n}"));
    }
    let leases = laptop_only();
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let summary = engine.reconcile().await.expect("pass completes");

    let attempts = registry.create_names();
    assert_eq!(attempts.len(), 11);
    assert_eq!(attempts.first().map(String::as_str), Some("laptop"));
    assert_eq!(attempts.last().map(String::as_str), Some("laptop-10"));
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.added, 0);
}

#[tokio::test]
async fn other_errors_are_not_retried_and_do_not_stop_the_pass() {
    let registry = MockRegistry::new();
    registry.break_name("laptop");
    let leases = StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![
            lease(LAPTOP_MAC, "192.168.1.10", Some("laptop")),
            lease("11:22:33:44:55:66", "192.168.1.11", Some("printer")),
        ],
    );
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let summary = engine.reconcile().await.expect("pass completes");

    // Leases are processed in MAC order
    assert_eq!(registry.create_names(), ["printer", "laptop"]);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.added, 1);
    assert!(registry.client("printer").is_some());
}

#[tokio::test]
async fn update_conflict_is_not_retried() {
    let registry = MockRegistry::with_clients(vec![RemoteClient::new(
        "old-name",
        [LAPTOP_MAC, "192.168.1.5"],
    )]);
    registry.take_name("laptop");
    let leases = laptop_only();
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let summary = engine.reconcile().await.expect("pass completes");

    let mutations = registry.mutations();
    assert_eq!(mutations.len(), 1, "got {mutations:?}");
    assert!(matches!(
        &mutations[0],
        Call::Update { current_name, client_name, .. }
            if current_name == "old-name" && client_name == "laptop"
    ));
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn suffixed_name_is_kept_on_update() {
    let registry = MockRegistry::with_clients(vec![RemoteClient::new(
        "laptop-1",
        [LAPTOP_MAC, "192.168.1.5"],
    )]);
    let leases = laptop_only();
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    engine.reconcile().await.expect("pass succeeds");

    assert_eq!(
        registry.mutations(),
        vec![Call::Update {
            current_name: "laptop-1".to_string(),
            client_name: "laptop-1".to_string(),
            ids: vec!["192.168.1.10".to_string(), LAPTOP_MAC.to_string()],
        }]
    );
}
