//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Reconciliation pass activity and per-table skips
//! - Agent lifecycle (spawn, init, teardown)
//! - Blueprint updates
//! - Directory map size
//! - Outstanding teardown tasks
//!
//! All metrics are prefixed with `reactor_driver_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track durations.
//!
//! [`PerfmonRegistry`] hands out per-table metric collections so the agent
//! and its storage can record under a stable `table` label.

use crate::identity::TableId;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one reconciliation pass and the number of tables scanned.
pub fn record_reconcile_pass(tables_scanned: usize) {
    counter!("reactor_driver_reconcile_passes_total").increment(1);
    counter!("reactor_driver_tables_scanned_total").increment(tables_scanned as u64);
}

/// Record a table skipped during reconciliation.
///
/// `reason` is one of `name_collision`, `not_in_blueprint`, `bad_config`.
pub fn record_table_skipped(table: &TableId, reason: &str) {
    counter!(
        "reactor_driver_tables_skipped_total",
        "table" => table.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Gauge for the number of live per-table agents.
pub fn set_active_tables(count: usize) {
    gauge!("reactor_driver_active_tables").set(count as f64);
}

/// Record an agent spawn (table went Absent → Active).
pub fn record_agent_spawned(table: &TableId) {
    counter!("reactor_driver_agents_spawned_total", "table" => table.to_string()).increment(1);
}

/// Record completed agent initialization.
pub fn record_agent_init(table: &TableId, duration: Duration) {
    counter!("reactor_driver_agent_inits_total", "table" => table.to_string()).increment(1);
    histogram!("reactor_driver_agent_init_duration_seconds").record(duration.as_secs_f64());
}

/// Record completed agent teardown.
pub fn record_agent_teardown(table: &TableId, duration: Duration) {
    counter!("reactor_driver_agent_teardowns_total", "table" => table.to_string()).increment(1);
    histogram!("reactor_driver_agent_teardown_duration_seconds").record(duration.as_secs_f64());
}

/// Record a blueprint pushed into a live agent's cell.
pub fn record_blueprint_update(table: &TableId) {
    counter!("reactor_driver_blueprint_updates_total", "table" => table.to_string()).increment(1);
}

/// Gauge for teardown tasks currently in flight.
pub fn set_teardowns_in_flight(count: usize) {
    gauge!("reactor_driver_teardowns_in_flight").set(count as f64);
}

/// Gauge for entries currently published in the directory map.
pub fn set_directory_entries(count: usize) {
    gauge!("reactor_driver_directory_entries").set(count as f64);
}

/// Per-table metric collections.
///
/// The agent records reactor-facing metrics under `table`; the storage
/// layer records under the same label through [`TableCollections::storage`].
#[derive(Debug, Clone)]
pub struct TableCollections {
    table: TableId,
}

impl TableCollections {
    /// Label value for this table.
    pub fn table(&self) -> &TableId {
        &self.table
    }

    /// Record a storage component shutdown under this table's label.
    pub fn record_storage_component_closed(&self, kind: &str) {
        counter!(
            "reactor_driver_storage_components_closed_total",
            "table" => self.table.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a directory publication for this table.
    pub fn record_directory_publish(&self) {
        counter!(
            "reactor_driver_directory_publishes_total",
            "table" => self.table.to_string()
        )
        .increment(1);
    }
}

/// Registry of per-table metric collections, keyed by table identity.
///
/// Collections are cheap label holders; the registry exists so the agent
/// acquires them through one seam, mirroring how storage handles are
/// acquired.
#[derive(Debug, Clone, Default)]
pub struct PerfmonRegistry;

impl PerfmonRegistry {
    pub fn new() -> Self {
        Self
    }

    /// The metric collections for one table.
    pub fn collections_for(&self, table: TableId) -> TableCollections {
        TableCollections { table }
    }
}
