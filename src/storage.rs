// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage seam: per-table storage handles and their staged teardown.
//!
//! The storage engine itself lives elsewhere; the driver only needs to
//! acquire a per-table handle, hand it to the reactor, and later shut it
//! down in a strict order:
//!
//! 1. each store, one at a time, in order
//! 2. the serializer
//! 3. the multiplexer, if any
//!
//! Never concurrently, never reordered — stores reference the serializer,
//! and the serializer references the multiplexer. [`TableStorage::close`]
//! encodes this sequence; nothing else in the crate shuts components down.

use crate::error::Result;
use crate::identity::TableId;
use crate::metrics::TableCollections;
use crate::reactor::BoxFuture;
use std::path::PathBuf;

/// Cheap, cloneable handle to the I/O backend configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoBackend {
    /// Whether stores should bypass the OS page cache.
    pub direct_io: bool,
}

/// One shutdown-ordered component of a table's storage: a store, the
/// serializer, or the multiplexer.
pub trait StorageComponent: Send + Sync {
    /// Shut the component down, consuming it. Runs on the component's own
    /// execution context; resolves when the component is fully closed.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// A table's storage handle: stores plus serializer plus optional
/// multiplexer, acquired from the [`StorageFactory`] and owned by the
/// table's agent.
pub struct TableStorage {
    stores: Vec<Box<dyn StorageComponent>>,
    serializer: Box<dyn StorageComponent>,
    multiplexer: Option<Box<dyn StorageComponent>>,
    collections: TableCollections,
}

impl TableStorage {
    pub fn new(
        stores: Vec<Box<dyn StorageComponent>>,
        serializer: Box<dyn StorageComponent>,
        multiplexer: Option<Box<dyn StorageComponent>>,
        collections: TableCollections,
    ) -> Self {
        Self {
            stores,
            serializer,
            multiplexer,
            collections,
        }
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Shut down every component in the mandated order.
    ///
    /// Stores close one at a time in their original order, then the
    /// serializer, then the multiplexer. Each close completes before the
    /// next begins.
    pub async fn close(self) {
        for store in self.stores {
            store.close().await;
            self.collections.record_storage_component_closed("store");
        }
        self.serializer.close().await;
        self.collections
            .record_storage_component_closed("serializer");
        if let Some(multiplexer) = self.multiplexer {
            multiplexer.close().await;
            self.collections
                .record_storage_component_closed("multiplexer");
        }
    }
}

/// Creates and destroys per-table storage; implemented by the storage
/// engine.
///
/// `open` returns the handle for a table, creating on-disk state if needed.
/// `destroy` removes the table's on-disk state entirely and is only called
/// after the handle has been closed.
pub trait StorageFactory: Send + Sync + 'static {
    fn open(
        &self,
        table: TableId,
        io: IoBackend,
        base_path: PathBuf,
        collections: TableCollections,
    ) -> BoxFuture<'_, Result<TableStorage>>;

    fn destroy(&self, table: TableId) -> BoxFuture<'_, Result<()>>;
}
