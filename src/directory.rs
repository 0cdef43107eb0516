// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide directory map and the per-table exporter.
//!
//! Every active table publishes its reactor's externally visible state into
//! one shared [`DirectoryMap`], keyed by table identity. Peer-facing layers
//! read the map (and watch its version channel) to discover what role this
//! node plays for each table.
//!
//! Writes are disciplined: only a table's own [`DirectoryExporter`] touches
//! that table's entry, and final removal happens in the agent's teardown,
//! strictly after the reactor is destroyed.
//!
//! # Deferred retraction
//!
//! The exporter subscribes to a watch channel owned by the reactor, so the
//! exporter must be dropped before the reactor. But the published entry
//! must outlive the exporter: parts of the reactor's own shutdown still
//! expect the entry to be present. The exporter is therefore constructed
//! with `retract_on_drop = false` and the agent removes the entry itself as
//! the last teardown step.

use crate::identity::TableId;
use crate::metrics::{self, TableCollections};
use crate::reactor::ReactorDirectory;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::trace;

/// Shared map of table id → published reactor directory state.
///
/// Lock discipline: the inner lock is held only for map operations, never
/// across an await point, so the map is safe to touch from synchronous and
/// asynchronous contexts alike.
#[derive(Debug)]
pub struct DirectoryMap {
    entries: RwLock<HashMap<TableId, ReactorDirectory>>,
    version: watch::Sender<u64>,
}

impl Default for DirectoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryMap {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            version,
        }
    }

    /// Publish (insert or replace) a table's entry.
    pub fn publish(&self, table: TableId, state: ReactorDirectory) {
        let len = {
            let mut entries = self.entries.write().expect("directory map poisoned");
            entries.insert(table, state);
            entries.len()
        };
        metrics::set_directory_entries(len);
        self.version.send_modify(|v| *v += 1);
    }

    /// Remove a table's entry. Returns whether an entry was present.
    pub fn remove(&self, table: &TableId) -> bool {
        let (removed, len) = {
            let mut entries = self.entries.write().expect("directory map poisoned");
            let removed = entries.remove(table).is_some();
            (removed, entries.len())
        };
        if removed {
            metrics::set_directory_entries(len);
            self.version.send_modify(|v| *v += 1);
        }
        removed
    }

    /// Current entry for a table, if published.
    pub fn get(&self, table: &TableId) -> Option<ReactorDirectory> {
        self.entries
            .read()
            .expect("directory map poisoned")
            .get(table)
            .cloned()
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.entries
            .read()
            .expect("directory map poisoned")
            .contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("directory map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to map changes. The value is a bump counter; readers
    /// re-read the map on change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

/// Copies one reactor's directory watch into the shared map.
///
/// Publishes the current value on construction, then mirrors every change
/// until dropped or until the reactor's sender goes away. Dropping the
/// exporter stops the copying task; whether the published entry is also
/// retracted is controlled by `retract_on_drop` (the agent passes `false`
/// and retracts explicitly after reactor teardown).
pub struct DirectoryExporter {
    map: Arc<DirectoryMap>,
    table: TableId,
    retract_on_drop: bool,
    task: tokio::task::JoinHandle<()>,
}

impl DirectoryExporter {
    pub fn new(
        map: Arc<DirectoryMap>,
        table: TableId,
        mut source: watch::Receiver<ReactorDirectory>,
        collections: TableCollections,
        retract_on_drop: bool,
    ) -> Self {
        map.publish(table, source.borrow().clone());
        collections.record_directory_publish();

        let task_map = Arc::clone(&map);
        let task = tokio::spawn(async move {
            while source.changed().await.is_ok() {
                let state = source.borrow_and_update().clone();
                trace!(table = %table, "republishing reactor directory state");
                task_map.publish(table, state);
                collections.record_directory_publish();
            }
            // Sender gone: the reactor is shutting down. Copying ends here;
            // entry removal stays with the teardown sequence.
        });

        Self {
            map,
            table,
            retract_on_drop,
            task,
        }
    }
}

impl Drop for DirectoryExporter {
    fn drop(&mut self) {
        self.task.abort();
        if self.retract_on_drop {
            self.map.remove(&self.table);
        }
    }
}
