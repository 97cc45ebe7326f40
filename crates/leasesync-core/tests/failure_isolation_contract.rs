//! Architectural Contract Test: Failure Isolation
//!
//! This test verifies that a failure never turns into destructive action.
//!
//! Constraints verified:
//! - An unreachable registry aborts the pass before leases are read
//! - With `treat_as_empty`, an unreachable registry leads to creates only
//! - Unreadable lease data skips the pass instead of deleting everything
//! - A lease without a hostname is skipped, not fatal
//! - Reverse DNS fills in missing hostnames only when enabled
//!
//! If this test fails, a transient outage can wipe the registry.

mod common;

use common::*;
use leasesync_core::config::FetchErrorPolicy;
use leasesync_core::{EngineEvent, Error, RemoteClient};

#[tokio::test]
async fn registry_fetch_failure_aborts_pass() {
    let registry = MockRegistry::with_clients(vec![RemoteClient::new(
        "laptop",
        [LAPTOP_MAC, "192.168.1.10"],
    )]);
    registry.fail_list(true);
    let leases = StaticLeaseSource::new("/tmp/dhcpd.leases", Vec::new());
    let (engine, mut events) =
        build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let result = engine.reconcile().await;

    assert!(matches!(result, Err(Error::RegistryFetch(_))), "got {result:?}");
    assert_eq!(leases.read_count(), 0);
    assert!(registry.mutations().is_empty());
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::PassSkipped { .. }))
    );
}

#[tokio::test]
async fn treat_as_empty_policy_only_creates() {
    let registry = MockRegistry::new();
    registry.fail_list(true);
    let leases = StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![lease(LAPTOP_MAC, "192.168.1.10", Some("laptop"))],
    );
    let mut config = minimal_config("/tmp/dhcpd.leases");
    config.engine.fetch_error_policy = FetchErrorPolicy::TreatAsEmpty;
    let (engine, _events) = build_engine(&registry, &leases, &config);

    let summary = engine.reconcile().await.expect("pass runs");

    assert_eq!(summary.added, 1);
    assert_eq!(registry.create_names(), ["laptop"]);
    assert!(
        registry
            .mutations()
            .iter()
            .all(|c| matches!(c, Call::Create { .. }))
    );
}

#[tokio::test]
async fn unreadable_leases_skip_the_pass() {
    let registry = MockRegistry::with_clients(vec![
        RemoteClient::new("laptop", [LAPTOP_MAC, "192.168.1.10"]),
        RemoteClient::new("printer", ["11:22:33:44:55:66", "192.168.1.11"]),
    ]);
    let leases = StaticLeaseSource::new("/tmp/dhcpd.leases", Vec::new());
    leases.set_unreadable(true);
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let result = engine.reconcile().await;

    assert!(matches!(result, Err(Error::LeaseRead { .. })), "got {result:?}");
    assert!(registry.mutations().is_empty());
    assert_eq!(registry.clients().len(), 2);
}

#[tokio::test]
async fn lease_without_hostname_is_skipped() {
    let registry = MockRegistry::new();
    let leases = StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![
            lease(LAPTOP_MAC, "192.168.1.10", None),
            lease("11:22:33:44:55:66", "192.168.1.11", Some("printer")),
        ],
    );
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));

    let summary = engine.reconcile().await.expect("pass succeeds");

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.added, 1);
    assert_eq!(registry.create_names(), ["printer"]);
}

#[tokio::test]
async fn reverse_dns_names_new_devices_when_enabled() {
    let registry = MockRegistry::new();
    let leases = StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![lease(LAPTOP_MAC, "192.168.1.10", None)],
    );
    let resolver = FixedResolver::new(Some("laptop"));
    let mut config = minimal_config("/tmp/dhcpd.leases");
    config.engine.reverse_dns_fallback = true;
    let (engine, _events) = build_engine(&registry, &leases, &config);
    let engine = engine.with_resolver(Box::new(FixedResolver::sharing_counters_with(&resolver)));

    let summary = engine.reconcile().await.expect("pass succeeds");

    assert_eq!(resolver.lookup_count(), 1);
    assert_eq!(summary.added, 1);
    assert_eq!(registry.create_names(), ["laptop"]);
}

#[tokio::test]
async fn reverse_dns_is_not_consulted_when_disabled() {
    let registry = MockRegistry::new();
    let leases = StaticLeaseSource::new(
        "/tmp/dhcpd.leases",
        vec![lease(LAPTOP_MAC, "192.168.1.10", None)],
    );
    let resolver = FixedResolver::new(Some("laptop"));
    let (engine, _events) = build_engine(&registry, &leases, &minimal_config("/tmp/dhcpd.leases"));
    let engine = engine.with_resolver(Box::new(FixedResolver::sharing_counters_with(&resolver)));

    let summary = engine.reconcile().await.expect("pass succeeds");

    assert_eq!(resolver.lookup_count(), 0);
    assert_eq!(summary.skipped, 1);
    assert!(registry.mutations().is_empty());
}
