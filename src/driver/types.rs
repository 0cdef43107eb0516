//! Driver input sources and status types.
//!
//! The driver consumes four reactive views of cluster state. Each is a
//! `tokio::sync::watch` channel: the metadata substrate publishes whole
//! snapshots, and the driver re-reads the latest value on every pass, so
//! redundant notifications coalesce naturally.

use crate::config::TableConfigMap;
use crate::identity::{NameMap, PeerMap};
use tokio::sync::watch;

/// The change sources the reconciliation driver subscribes to.
///
/// Any change to any of them re-triggers a full reconciliation pass over
/// all tables.
pub struct DriverSources {
    /// Table id → present-with-config or deletion tombstone.
    pub tables: watch::Receiver<TableConfigMap>,
    /// Declared server name → servers claiming it.
    pub names: watch::Receiver<NameMap>,
    /// Server id → peer id for connected servers.
    pub peers: watch::Receiver<PeerMap>,
    /// Latches true when this node has been permanently removed from the
    /// cluster; never goes back to false.
    pub removed: watch::Receiver<bool>,
}

/// Point-in-time driver diagnostics.
///
/// Collected from cached internal state only; no I/O and no suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatus {
    /// Live per-table agents.
    pub active_tables: usize,
    /// Asynchronous teardown tasks not yet finished.
    pub teardowns_in_flight: usize,
    /// Entries currently published in the directory map.
    pub directory_entries: usize,
    /// Whether the permanent-removal signal has fired.
    pub permanently_removed: bool,
}
