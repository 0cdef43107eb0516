// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation driver.
//!
//! The driver owns the set of live per-table agents and keeps it matching
//! the declared cluster configuration:
//!
//! 1. Watches table configs, the server name map, the server→peer map, and
//!    this node's permanent-removal signal.
//! 2. On any change, re-scans **all** tables (correctness over efficiency;
//!    table counts are modest) and for each decides: create an agent, push
//!    a new blueprint into the existing one, or detach it for teardown.
//! 3. Detached agents are destroyed by independently scheduled tasks
//!    because teardown can suspend and [`ReactorDriver::on_change`] must
//!    not: it runs synchronously inside a change notification.
//!
//! # Per-table decisions
//!
//! | Condition | Action |
//! |---|---|
//! | deleted (or node removed) and agent live | detach now, destroy async |
//! | present, not seen before, this node in blueprint | spawn agent |
//! | present, agent live, blueprint differs | update cell in place |
//! | name collision in config | skip; retry on next event |
//! | this node not in blueprint peer set | skip; startup race, retry |
//!
//! A skipped table keeps its last-known blueprint until the condition
//! clears; the reactor never observes a partial update.

mod types;

pub use types::{DriverSources, DriverStatus};

use crate::agent::{AgentContext, TableAgent};
use crate::blueprint::construct_blueprint;
use crate::config::{DriverSettings, TableConfigState};
use crate::directory::DirectoryMap;
use crate::drain::DrainCoordinator;
use crate::error::DriverError;
use crate::identity::{IdentitySnapshot, PeerId, TableId};
use crate::metrics::{self, PerfmonRegistry};
use crate::reactor::{PermissiveAckPolicy, ReactorFactory};
use crate::storage::{IoBackend, StorageFactory};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Drives per-table reactors to match the declared configuration.
pub struct ReactorDriver {
    ctx: AgentContext,
    settings: DriverSettings,
    sources: DriverSources,
    agents: HashMap<TableId, TableAgent>,
    drainer: DrainCoordinator,
}

impl ReactorDriver {
    /// Build the driver and run the first reconciliation pass.
    ///
    /// The initial pass happens here, before any change event, so tables
    /// already present in the config come up without waiting for churn.
    /// Must be called from within a Tokio runtime: agent initialization is
    /// scheduled onto it immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_path: PathBuf,
        io: IoBackend,
        local_peer: PeerId,
        storage_factory: Arc<dyn StorageFactory>,
        reactor_factory: Arc<dyn ReactorFactory>,
        directory: Arc<DirectoryMap>,
        perfmon: PerfmonRegistry,
        settings: DriverSettings,
        sources: DriverSources,
    ) -> Self {
        let ctx = AgentContext {
            base_path,
            io,
            local_peer,
            storage_factory,
            reactor_factory,
            directory,
            perfmon,
            // Placeholder policy until consistency levels are configurable.
            ack_policy: Arc::new(PermissiveAckPolicy),
        };
        let mut driver = Self {
            ctx,
            settings,
            sources,
            agents: HashMap::new(),
            drainer: DrainCoordinator::new(),
        };
        driver.on_change();
        driver
    }

    /// One full reconciliation pass.
    ///
    /// Synchronous and non-suspending end to end: every operation that
    /// might block is handed to a spawned task. Public so tests (and
    /// callers embedding the driver in their own event loop) can run passes
    /// deterministically.
    pub fn on_change(&mut self) {
        let tables = self.sources.tables.borrow_and_update().clone();
        let names = self.sources.names.borrow_and_update().clone();
        let peers = self.sources.peers.borrow_and_update().clone();
        let removed = *self.sources.removed.borrow_and_update();
        let identities = IdentitySnapshot::capture(&names, &peers);

        metrics::record_reconcile_pass(tables.len());
        debug!(
            tables = tables.len(),
            servers = peers.len(),
            removed,
            "reconciliation pass"
        );

        for (table, state) in &tables {
            if (state.is_deleted() || removed) && self.agents.contains_key(table) {
                // Detach synchronously; destroy asynchronously. Teardown can
                // suspend and this pass must not.
                if let Some(agent) = self.agents.remove(table) {
                    self.spawn_teardown(agent, true);
                }
            } else if let TableConfigState::Present(repl) = state {
                if let Err(e) = repl.validate() {
                    warn!(table = %table, error = %e, "skipping table with malformed config");
                    metrics::record_table_skipped(table, "bad_config");
                    continue;
                }

                let blueprint = match construct_blueprint(repl, &identities) {
                    Ok(blueprint) => blueprint,
                    Err(DriverError::NameCollision { name }) => {
                        // Leave the previous blueprint in place; the operator
                        // resolves the collision and a later event retries.
                        debug!(table = %table, name = %name,
                               "skipping table update due to server name collision");
                        metrics::record_table_skipped(table, "name_collision");
                        continue;
                    }
                    Err(e) => {
                        warn!(table = %table, error = %e, "skipping table");
                        metrics::record_table_skipped(table, "bad_config");
                        continue;
                    }
                };

                if !blueprint.contains_peer(&self.ctx.local_peer) {
                    // Brief startup window where our own server id has not
                    // yet landed in the identity maps. The next mapping
                    // change re-runs this pass.
                    debug!(table = %table, "local peer not in blueprint yet, skipping");
                    metrics::record_table_skipped(table, "not_in_blueprint");
                    continue;
                }

                if let Some(agent) = self.agents.get(table) {
                    agent.update_blueprint(blueprint);
                } else {
                    let agent = TableAgent::spawn(self.ctx.clone(), *table, blueprint);
                    self.agents.insert(*table, agent);
                }
            }
        }

        metrics::set_active_tables(self.agents.len());
    }

    /// Hand a detached agent to an independently scheduled teardown task.
    ///
    /// `destroy_data` removes the table's on-disk state afterwards; that is
    /// wanted when the table was deleted (or this node removed), not when
    /// the whole driver is shutting down.
    fn spawn_teardown(&self, agent: TableAgent, destroy_data: bool) {
        let table = agent.table();
        let token = self.drainer.token();
        let storage_factory = Arc::clone(&self.ctx.storage_factory);
        let warn_after = self.settings.teardown_warn_after_duration();

        info!(table = %table, destroy_data, "detaching table agent for deferred teardown");
        tokio::spawn(async move {
            let _token = token;
            let started = Instant::now();

            agent.shutdown().await;
            if destroy_data {
                if let Err(e) = storage_factory.destroy(table).await {
                    error!(table = %table, error = %e, "failed to destroy table storage");
                    panic!("storage destruction failed for table {table}: {e}");
                }
            }

            if started.elapsed() > warn_after {
                warn!(table = %table, elapsed_ms = started.elapsed().as_millis() as u64,
                      "table teardown was slow");
            }
        });
    }

    /// Whether a table currently has a live agent.
    pub fn is_active(&self, table: &TableId) -> bool {
        self.agents.contains_key(table)
    }

    /// The live agent for a table, if any.
    pub fn agent(&self, table: &TableId) -> Option<&TableAgent> {
        self.agents.get(table)
    }

    /// Driver diagnostics from cached state; performs no I/O.
    pub fn status(&self) -> DriverStatus {
        DriverStatus {
            active_tables: self.agents.len(),
            teardowns_in_flight: self.drainer.outstanding(),
            directory_entries: self.ctx.directory.len(),
            permanently_removed: *self.sources.removed.borrow(),
        }
    }

    /// Event loop: reconcile on every change until `stop` fires or a
    /// change source closes, then shut down.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(local_peer = %self.ctx.local_peer, "reactor driver running");
        loop {
            let closed = tokio::select! {
                res = self.sources.tables.changed() => res.is_err(),
                res = self.sources.names.changed() => res.is_err(),
                res = self.sources.peers.changed() => res.is_err(),
                res = self.sources.removed.changed() => res.is_err(),
                _ = stop.changed() => true,
            };
            if closed {
                break;
            }
            self.on_change();
        }
        self.shutdown().await;
    }

    /// Detach every remaining agent and wait for all teardown tasks.
    ///
    /// The drain is mandatory: teardown tasks hold references into
    /// driver-owned collaborators, so the driver must outlive them all.
    /// On-disk state is kept; shutting the process down is not deleting
    /// tables.
    pub async fn shutdown(mut self) {
        info!(agents = self.agents.len(), "shutting down reactor driver");

        let agents: Vec<TableAgent> = self.agents.drain().map(|(_, agent)| agent).collect();
        for agent in agents {
            self.spawn_teardown(agent, false);
        }
        metrics::set_active_tables(0);

        self.drainer.drain().await;
        info!("reactor driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfigMap;
    use crate::identity::{NameMap, PeerMap};

    // Full lifecycle scenarios live in tests/integration.rs with mock
    // reactor and storage factories; these cover the plumbing that needs
    // no agents at all.

    fn empty_sources() -> (
        watch::Sender<TableConfigMap>,
        watch::Sender<NameMap>,
        watch::Sender<PeerMap>,
        watch::Sender<bool>,
        DriverSources,
    ) {
        let (tables_tx, tables) = watch::channel(TableConfigMap::new());
        let (names_tx, names) = watch::channel(NameMap::new());
        let (peers_tx, peers) = watch::channel(PeerMap::new());
        let (removed_tx, removed) = watch::channel(false);
        (
            tables_tx,
            names_tx,
            peers_tx,
            removed_tx,
            DriverSources {
                tables,
                names,
                peers,
                removed,
            },
        )
    }

    fn never_built_factories() -> (Arc<dyn StorageFactory>, Arc<dyn ReactorFactory>) {
        use crate::error::Result;
        use crate::metrics::TableCollections;
        use crate::reactor::{BoxFuture, Reactor, ReactorContext};
        use crate::storage::TableStorage;

        struct Unreachable;
        impl StorageFactory for Unreachable {
            fn open(
                &self,
                table: TableId,
                _io: IoBackend,
                _base_path: PathBuf,
                _collections: TableCollections,
            ) -> BoxFuture<'_, Result<TableStorage>> {
                Box::pin(async move { panic!("no storage expected for table {table}") })
            }
            fn destroy(&self, _table: TableId) -> BoxFuture<'_, Result<()>> {
                Box::pin(async { Ok(()) })
            }
        }
        struct NoReactors;
        impl ReactorFactory for NoReactors {
            fn build(&self, ctx: ReactorContext) -> BoxFuture<'_, Result<Box<dyn Reactor>>> {
                Box::pin(async move { panic!("no reactor expected for table {}", ctx.table) })
            }
        }
        (Arc::new(Unreachable), Arc::new(NoReactors))
    }

    #[tokio::test]
    async fn empty_config_creates_no_agents() {
        let (_t, _n, _p, _r, sources) = empty_sources();
        let (storage, reactors) = never_built_factories();

        let driver = ReactorDriver::new(
            PathBuf::from("/tmp/rd-test"),
            IoBackend::default(),
            PeerId::new(),
            storage,
            reactors,
            Arc::new(DirectoryMap::new()),
            PerfmonRegistry::new(),
            DriverSettings::default(),
            sources,
        );

        let status = driver.status();
        assert_eq!(status.active_tables, 0);
        assert_eq!(status.teardowns_in_flight, 0);
        assert_eq!(status.directory_entries, 0);
        assert!(!status.permanently_removed);
    }

    #[tokio::test]
    async fn table_skipped_when_local_peer_unknown() {
        use crate::config::TableReplicationConfig;
        use crate::identity::ServerId;
        use std::collections::BTreeSet;

        let (tables_tx, _n, _p, _r, sources) = empty_sources();
        let (storage, reactors) = never_built_factories();

        // A table exists, but the identity maps know nothing about this
        // node, so its peer cannot appear in any blueprint.
        let director = ServerId::new();
        let mut tables = TableConfigMap::new();
        tables.insert(
            TableId::new(),
            TableConfigState::Present(TableReplicationConfig::for_testing(
                director,
                BTreeSet::new(),
            )),
        );
        tables_tx.send(tables).unwrap();

        let mut driver = ReactorDriver::new(
            PathBuf::from("/tmp/rd-test"),
            IoBackend::default(),
            PeerId::new(),
            storage,
            reactors,
            Arc::new(DirectoryMap::new()),
            PerfmonRegistry::new(),
            DriverSettings::default(),
            sources,
        );
        driver.on_change();

        assert_eq!(driver.status().active_tables, 0);
    }

    #[tokio::test]
    async fn shutdown_with_no_agents_drains_immediately() {
        let (_t, _n, _p, _r, sources) = empty_sources();
        let (storage, reactors) = never_built_factories();

        let driver = ReactorDriver::new(
            PathBuf::from("/tmp/rd-test"),
            IoBackend::default(),
            PeerId::new(),
            storage,
            reactors,
            Arc::new(DirectoryMap::new()),
            PerfmonRegistry::new(),
            DriverSettings::default(),
            sources,
        );
        driver.shutdown().await;
    }
}
