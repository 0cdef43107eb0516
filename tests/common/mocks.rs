//! Mock reactor and storage factories.
//!
//! Both record every lifecycle event into a shared [`EventLog`] so tests
//! can assert global ordering (reactor stop before storage close before
//! storage destroy, and so on). The mock reactor additionally checks the
//! process-wide directory map at stop time, which is how tests verify that
//! entry retraction really is deferred past reactor destruction.

use super::EventLog;
use reactor_driver::error::Result;
use reactor_driver::metrics::TableCollections;
use reactor_driver::reactor::{
    BoxFuture, Reactor, ReactorContext, ReactorDirectory, ReactorFactory,
};
use reactor_driver::storage::{IoBackend, StorageComponent, StorageFactory, TableStorage};
use reactor_driver::{Blueprint, DirectoryMap, TableId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Handles to one mock reactor, kept for test assertions.
pub struct BuiltReactor {
    pub table: TableId,
    /// Push directory updates the exporter should mirror.
    pub directory_tx: Arc<watch::Sender<ReactorDirectory>>,
    /// The blueprint view the reactor observes.
    pub blueprint: watch::Receiver<Blueprint>,
}

struct MockReactor {
    table: TableId,
    directory_tx: Arc<watch::Sender<ReactorDirectory>>,
    directory_map: Arc<DirectoryMap>,
    log: EventLog,
}

impl Reactor for MockReactor {
    fn directory(&self) -> watch::Receiver<ReactorDirectory> {
        self.directory_tx.subscribe()
    }

    fn stop(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            // The directory entry must still be published while the reactor
            // winds down; removal comes after.
            let entry_present = self.directory_map.contains(&self.table);
            self.log.lock().unwrap().push(format!(
                "reactor-stop:{}:entry_present={}",
                self.table, entry_present
            ));
        })
    }
}

/// Factory producing [`MockReactor`]s, with a configurable init delay to
/// widen the window for construction/teardown races.
pub struct MockReactorFactory {
    log: EventLog,
    directory_map: Arc<DirectoryMap>,
    init_delay: Duration,
    built: Mutex<Vec<BuiltReactor>>,
    build_count: AtomicUsize,
}

impl MockReactorFactory {
    pub fn new(log: EventLog, directory_map: Arc<DirectoryMap>, init_delay: Duration) -> Self {
        Self {
            log,
            directory_map,
            init_delay,
            built: Mutex::new(Vec::new()),
            build_count: AtomicUsize::new(0),
        }
    }

    /// Total reactors ever built.
    pub fn build_count(&self) -> usize {
        self.build_count.load(Ordering::SeqCst)
    }

    /// Assertion handles for every built reactor, in build order.
    pub fn built(&self) -> Vec<BuiltReactor> {
        let mut guard = self.built.lock().unwrap();
        guard
            .iter()
            .map(|b| BuiltReactor {
                table: b.table,
                directory_tx: Arc::clone(&b.directory_tx),
                blueprint: b.blueprint.clone(),
            })
            .collect()
    }
}

impl ReactorFactory for MockReactorFactory {
    fn build(&self, ctx: ReactorContext) -> BoxFuture<'_, Result<Box<dyn Reactor>>> {
        Box::pin(async move {
            if !self.init_delay.is_zero() {
                tokio::time::sleep(self.init_delay).await;
            }
            self.build_count.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("reactor-build:{}", ctx.table));

            let directory_tx = Arc::new(watch::channel(ReactorDirectory::default()).0);
            self.built.lock().unwrap().push(BuiltReactor {
                table: ctx.table,
                directory_tx: Arc::clone(&directory_tx),
                blueprint: ctx.blueprint.clone(),
            });

            Ok(Box::new(MockReactor {
                table: ctx.table,
                directory_tx,
                directory_map: Arc::clone(&self.directory_map),
                log: Arc::clone(&self.log),
            }) as Box<dyn Reactor>)
        })
    }
}

/// Storage component that logs its close, labeled by kind and table.
struct LoggingComponent {
    label: String,
    log: EventLog,
}

impl StorageComponent for LoggingComponent {
    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(self.label);
        })
    }
}

/// Factory producing logged mock storage, two stores per table.
pub struct MockStorageFactory {
    log: EventLog,
    open_count: AtomicUsize,
}

impl MockStorageFactory {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            open_count: AtomicUsize::new(0),
        }
    }

    /// Total storage handles ever opened.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    fn component(&self, label: String) -> Box<dyn StorageComponent> {
        Box::new(LoggingComponent {
            label,
            log: Arc::clone(&self.log),
        })
    }
}

impl StorageFactory for MockStorageFactory {
    fn open(
        &self,
        table: TableId,
        _io: IoBackend,
        _base_path: PathBuf,
        collections: TableCollections,
    ) -> BoxFuture<'_, Result<TableStorage>> {
        Box::pin(async move {
            self.open_count.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("storage-open:{table}"));

            Ok(TableStorage::new(
                vec![
                    self.component(format!("store-close:{table}:0")),
                    self.component(format!("store-close:{table}:1")),
                ],
                self.component(format!("serializer-close:{table}")),
                Some(self.component(format!("multiplexer-close:{table}"))),
                collections,
            ))
        })
    }

    fn destroy(&self, table: TableId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log
                .lock()
                .unwrap()
                .push(format!("storage-destroy:{table}"));
            Ok(())
        })
    }
}
