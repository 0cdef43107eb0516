// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-table agent: one reactor, one storage handle, one directory export.
//!
//! The agent binds together everything one table needs on this node. Its
//! lifecycle is deliberately asymmetric:
//!
//! - **Construction is instant.** [`TableAgent::spawn`] returns a handle
//!   immediately; storage acquisition and reactor construction run in a
//!   separate task. An init-complete signal becomes observable once the
//!   reactor exists, and no operation assumes the reactor before then.
//! - **Reconfiguration is in place.** The blueprint lives in a watch
//!   channel the reactor observes; the driver swaps the value through
//!   [`TableAgent::update_blueprint`] and the agent is never recreated.
//! - **Teardown is staged and strict.** [`TableAgent::shutdown`] waits for
//!   initialization, then destroys the directory exporter (it borrows from
//!   the reactor's watch channel), then stops the reactor, and only then
//!   removes the table's directory entry and closes storage. Reordering
//!   any of these is a dangling-subscription bug; the phase machine panics
//!   if the sequence is violated.

use crate::blueprint::Blueprint;
use crate::directory::{DirectoryExporter, DirectoryMap};
use crate::identity::{PeerId, TableId};
use crate::metrics::{self, PerfmonRegistry};
use crate::reactor::{AckPolicy, Reactor, ReactorContext, ReactorFactory};
use crate::storage::{IoBackend, StorageFactory, TableStorage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Lifecycle phase of a per-table agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Spawned; reactor and storage do not exist yet.
    Initializing,
    /// Reactor running, directory entry published.
    Live,
    /// Teardown finished; nothing remains but the handle.
    TornDown,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPhase::Initializing => write!(f, "Initializing"),
            AgentPhase::Live => write!(f, "Live"),
            AgentPhase::TornDown => write!(f, "TornDown"),
        }
    }
}

/// Guarded phase transition. Out-of-sequence teardown is a logic bug, not
/// a recoverable condition.
fn advance(phase: &Mutex<AgentPhase>, from: AgentPhase, to: AgentPhase) {
    let mut guard = phase.lock().expect("agent phase poisoned");
    assert_eq!(
        *guard, from,
        "invalid agent state: expected {from}, got {}",
        *guard
    );
    *guard = to;
}

/// Collaborators an agent needs; assembled once by the driver and cloned
/// per table.
#[derive(Clone)]
pub struct AgentContext {
    pub base_path: PathBuf,
    pub io: IoBackend,
    pub local_peer: PeerId,
    pub storage_factory: Arc<dyn StorageFactory>,
    pub reactor_factory: Arc<dyn ReactorFactory>,
    pub directory: Arc<DirectoryMap>,
    pub perfmon: PerfmonRegistry,
    pub ack_policy: Arc<dyn AckPolicy>,
}

/// Everything the init task produces; consumed by teardown.
struct AgentRuntime {
    exporter: DirectoryExporter,
    reactor: Box<dyn Reactor>,
    storage: Arc<TableStorage>,
}

/// Handle to one table's reactor + storage binding.
pub struct TableAgent {
    table: TableId,
    blueprint_tx: watch::Sender<Blueprint>,
    init_done: watch::Receiver<bool>,
    runtime: Arc<Mutex<Option<AgentRuntime>>>,
    phase: Arc<Mutex<AgentPhase>>,
    directory: Arc<DirectoryMap>,
}

impl TableAgent {
    /// Create the agent and schedule its initialization.
    ///
    /// Returns immediately; the reactor does not exist until the
    /// init-complete signal fires. The initial blueprint seeds the watch
    /// channel the reactor will observe.
    pub fn spawn(ctx: AgentContext, table: TableId, initial: Blueprint) -> Self {
        let (blueprint_tx, blueprint_rx) = watch::channel(initial);
        let (init_tx, init_done) = watch::channel(false);
        let runtime = Arc::new(Mutex::new(None));
        let phase = Arc::new(Mutex::new(AgentPhase::Initializing));

        metrics::record_agent_spawned(&table);
        info!(table = %table, "spawning table agent");

        let task_runtime = Arc::clone(&runtime);
        let task_phase = Arc::clone(&phase);
        let directory = Arc::clone(&ctx.directory);
        tokio::spawn(async move {
            let started = Instant::now();
            let collections = ctx.perfmon.collections_for(table);

            let storage = match ctx
                .storage_factory
                .open(table, ctx.io, ctx.base_path.clone(), collections.clone())
                .await
            {
                Ok(storage) => Arc::new(storage),
                Err(e) => {
                    error!(table = %table, error = %e, "failed to acquire storage handle");
                    panic!("storage handle acquisition failed for table {table}: {e}");
                }
            };

            let reactor = match ctx
                .reactor_factory
                .build(ReactorContext {
                    table,
                    blueprint: blueprint_rx,
                    storage: Arc::clone(&storage),
                    collections: collections.clone(),
                    ack_policy: Arc::clone(&ctx.ack_policy),
                    base_path: ctx.base_path.clone(),
                    local_peer: ctx.local_peer,
                })
                .await
            {
                Ok(reactor) => reactor,
                Err(e) => {
                    error!(table = %table, error = %e, "failed to construct reactor");
                    panic!("reactor construction failed for table {table}: {e}");
                }
            };

            // Publish the reactor's directory state. Retraction on exporter
            // drop stays off: the entry must outlive the exporter and go
            // away only after the reactor itself is gone.
            let exporter = DirectoryExporter::new(
                Arc::clone(&ctx.directory),
                table,
                reactor.directory(),
                collections,
                false,
            );

            *task_runtime.lock().expect("agent runtime poisoned") = Some(AgentRuntime {
                exporter,
                reactor,
                storage,
            });
            advance(&task_phase, AgentPhase::Initializing, AgentPhase::Live);
            metrics::record_agent_init(&table, started.elapsed());
            info!(table = %table, elapsed_ms = started.elapsed().as_millis() as u64,
                  "table agent initialized");

            let _ = init_tx.send(true);
        });

        Self {
            table,
            blueprint_tx,
            init_done,
            runtime,
            phase,
            directory,
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> AgentPhase {
        *self.phase.lock().expect("agent phase poisoned")
    }

    /// Swap in a new blueprint if it differs from the current one.
    ///
    /// Structural comparison means an equal blueprint neither reports a
    /// change nor wakes the reactor. Safe to call in any phase; the reactor
    /// reads the cell when it comes up.
    pub fn update_blueprint(&self, blueprint: Blueprint) -> bool {
        let changed = self.blueprint_tx.send_if_modified(|current| {
            if *current == blueprint {
                false
            } else {
                *current = blueprint;
                true
            }
        });
        if changed {
            metrics::record_blueprint_update(&self.table);
            debug!(table = %self.table, "blueprint updated in place");
        }
        changed
    }

    /// The blueprint currently in the cell.
    pub fn current_blueprint(&self) -> Blueprint {
        self.blueprint_tx.borrow().clone()
    }

    /// Wait until initialization has completed.
    pub async fn wait_initialized(&self) {
        let mut rx = self.init_done.clone();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Tear the agent down, in order, consuming it.
    ///
    /// 1. Wait for initialization — teardown never races construction; a
    ///    table deleted mid-init pays the latency instead of corrupting
    ///    state.
    /// 2. Destroy the directory exporter. It subscribes to a watch channel
    ///    the reactor owns, so it must go first.
    /// 3. Stop the reactor. Parts of its shutdown still expect the
    ///    directory entry to be present.
    /// 4. Remove the table's directory entry.
    /// 5. Close storage: stores in order, serializer, multiplexer.
    pub async fn shutdown(self) {
        let started = Instant::now();
        self.wait_initialized().await;

        let runtime = self
            .runtime
            .lock()
            .expect("agent runtime poisoned")
            .take()
            .unwrap_or_else(|| {
                panic!(
                    "agent for table {} has no runtime after init signal",
                    self.table
                )
            });
        advance(&self.phase, AgentPhase::Live, AgentPhase::TornDown);
        debug!(table = %self.table, "tearing down table agent");

        drop(runtime.exporter);
        runtime.reactor.stop().await;
        self.directory.remove(&self.table);

        let storage = Arc::try_unwrap(runtime.storage).unwrap_or_else(|_| {
            panic!(
                "storage handle for table {} still shared after reactor stop",
                self.table
            )
        });
        storage.close().await;

        metrics::record_agent_teardown(&self.table, started.elapsed());
        info!(table = %self.table, elapsed_ms = started.elapsed().as_millis() as u64,
              "table agent torn down");
    }
}
