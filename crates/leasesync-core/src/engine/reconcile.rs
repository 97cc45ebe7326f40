//! Reconciliation planning
//!
//! Pure diffing of one pass's inputs (leases, registry clients, neighbor
//! snapshot) into the actions the executor should take. Nothing here
//! performs I/O, so every rule of a pass can be tested directly.
//!
//! All identifiers are canonicalized with [`canonical_identifier`] before
//! comparison, so `AA-BB-..` in the registry and `aa:bb:..` in a lease file
//! are the same device and `fd00:0::1` equals `fd00::1`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::Error;
use crate::mac::{MacAddress, canonical_identifier};
use crate::neighbor::NeighborSnapshot;
use crate::traits::{LeaseMap, RemoteClient};

/// What to do with one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Registry already matches
    NoUpdate,
    /// Create a new client
    Add,
    /// Replace an existing client's identifiers
    Update,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::NoUpdate => write!(f, "no update"),
            ActionKind::Add => write!(f, "add"),
            ActionKind::Update => write!(f, "update"),
        }
    }
}

/// Planned outcome for one device with an active lease
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationAction {
    pub kind: ActionKind,
    pub mac: MacAddress,
    /// Name to create or update to; the current name for `NoUpdate`
    pub hostname: String,
    /// Canonical identifiers the client should carry
    ///
    /// Excludes the MAC for `Add` (the create call carries it separately)
    /// and includes it for `Update` (the identifier list is replaced).
    pub wanted: BTreeSet<String>,
    pub reason: String,
    /// Name the registry knows the client by (`Update` only)
    pub current_name: Option<String>,
    /// Existing client settings to carry over (`Update` only)
    pub settings: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ReconciliationAction {
    /// The replacement client for an `Update`
    pub fn updated_client(&self) -> RemoteClient {
        RemoteClient {
            name: self.hostname.clone(),
            ids: self.wanted.iter().cloned().collect(),
            settings: self.settings.clone().unwrap_or_default(),
        }
    }
}

/// Everything one pass intends to do
#[derive(Debug, Default)]
pub struct Plan {
    /// One action per active lease that could be planned
    pub actions: Vec<ReconciliationAction>,
    /// Devices left alone, with the reason (currently `Error::NoHostname`)
    pub skipped: Vec<Error>,
    /// Registry clients whose MAC has no active lease
    pub stale: Vec<RemoteClient>,
}

/// Planner knobs
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    /// Highest `-N` suffix the add retry produces
    pub max_name_suffix: usize,
}

/// Map registry clients by MAC
///
/// A client is keyed by the first identifier that parses as a MAC; clients
/// without one are invisible to reconciliation. When two clients claim the
/// same MAC the first one wins.
pub fn index_clients(clients: &[RemoteClient]) -> BTreeMap<MacAddress, &RemoteClient> {
    let mut index: BTreeMap<MacAddress, &RemoteClient> = BTreeMap::new();
    for client in clients {
        let Some(mac) = client.mac() else {
            continue;
        };
        if let Some(first) = index.get(&mac) {
            warn!(
                "Clients '{}' and '{}' share MAC {}; using '{}'",
                first.name, client.name, mac, first.name
            );
            continue;
        }
        index.insert(mac, client);
    }
    index
}

/// Diff one pass's inputs into a [`Plan`]
pub fn plan(
    leases: &LeaseMap,
    clients: &[RemoteClient],
    neighbors: &NeighborSnapshot,
    options: PlanOptions,
) -> Plan {
    let index = index_clients(clients);
    let mut processed = BTreeSet::new();
    let mut result = Plan::default();

    for (mac, lease) in leases.iter().filter(|(_, lease)| lease.is_active) {
        processed.insert(*mac);

        let mut wanted: BTreeSet<String> = neighbors
            .addresses_for(mac)
            .iter()
            .map(|addr| canonical_identifier(addr))
            .collect();
        wanted.insert(lease.ip.to_string());

        let Some(existing) = index.get(mac) else {
            match &lease.hostname {
                Some(hostname) => result.actions.push(ReconciliationAction {
                    kind: ActionKind::Add,
                    mac: *mac,
                    hostname: hostname.clone(),
                    wanted,
                    reason: "new client".to_string(),
                    current_name: None,
                    settings: None,
                }),
                None => result.skipped.push(Error::NoHostname {
                    mac: mac.to_string(),
                }),
            }
            continue;
        };

        let existing_ids: BTreeSet<String> = existing
            .ids
            .iter()
            .filter(|id| MacAddress::parse(id) != Some(*mac))
            .map(|id| canonical_identifier(id))
            .collect();

        let missing = wanted.iter().find(|id| !existing_ids.contains(*id));
        let extra = existing_ids.iter().find(|id| !wanted.contains(*id));

        // `wanted` always holds the lease IP, so an unregistered lease IP
        // surfaces as a missing identifier.
        let reason = match (missing, extra) {
            (Some(id), _) => Some(format!("missing identifier: {id}")),
            (None, Some(id)) => Some(format!("extra identifier: {id}")),
            (None, None) => None,
        };

        let action = match reason {
            Some(reason) => {
                wanted.insert(mac.to_string());
                ReconciliationAction {
                    kind: ActionKind::Update,
                    mac: *mac,
                    hostname: update_target_name(
                        &existing.name,
                        lease.hostname.as_deref(),
                        options.max_name_suffix,
                    ),
                    wanted,
                    reason,
                    current_name: Some(existing.name.clone()),
                    settings: Some(existing.settings.clone()),
                }
            }
            None => ReconciliationAction {
                kind: ActionKind::NoUpdate,
                mac: *mac,
                hostname: existing.name.clone(),
                wanted,
                reason: "up to date".to_string(),
                current_name: None,
                settings: None,
            },
        };
        result.actions.push(action);
    }

    result.stale = index
        .into_iter()
        .filter(|(mac, _)| !processed.contains(mac))
        .map(|(_, client)| client.clone())
        .collect();

    result
}

/// Names tried, in order, when creating a client called `hostname`
///
/// `hostname`, `hostname-1`, ..., `hostname-{max_suffix}`
pub fn name_candidates(hostname: &str, max_suffix: usize) -> impl Iterator<Item = String> + '_ {
    std::iter::once(hostname.to_string())
        .chain((1..=max_suffix).map(move |n| format!("{hostname}-{n}")))
}

/// Name an updated client should carry
///
/// The lease hostname wins, except that an existing name is kept when the
/// lease has no hostname, or when the existing name is the hostname itself
/// or one of the suffixed names [`name_candidates`] produces for it.
pub fn update_target_name(existing: &str, lease_hostname: Option<&str>, max_suffix: usize) -> String {
    match lease_hostname {
        Some(hostname) if !is_candidate_of(existing, hostname, max_suffix) => hostname.to_string(),
        _ => existing.to_string(),
    }
}

fn is_candidate_of(name: &str, hostname: &str, max_suffix: usize) -> bool {
    if name == hostname {
        return true;
    }
    name.strip_prefix(hostname)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .is_some_and(|n| (1..=max_suffix).contains(&n))
}
