//! In-test cluster wiring: watch channels, mocks, and a driver.

use super::{new_log, EventLog, MockReactorFactory, MockStorageFactory};
use reactor_driver::config::{TableConfigMap, TableConfigState};
use reactor_driver::identity::{NameMap, PeerMap, PeerId, ServerId, TableId};
use reactor_driver::metrics::PerfmonRegistry;
use reactor_driver::storage::IoBackend;
use reactor_driver::{DirectoryMap, DriverSettings, DriverSources, ReactorDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn storage_factory_handle(
    factory: &Arc<MockStorageFactory>,
) -> Arc<dyn reactor_driver::StorageFactory> {
    factory.clone()
}

fn reactor_factory_handle(
    factory: &Arc<MockReactorFactory>,
) -> Arc<dyn reactor_driver::ReactorFactory> {
    factory.clone()
}

/// One simulated cluster feeding one driver under test.
///
/// The builder owns the sending halves of every change source plus the
/// current map values, so tests mutate cluster state through small helpers
/// and then run `driver.on_change()` deterministically.
pub struct TestCluster {
    pub log: EventLog,
    pub directory: Arc<DirectoryMap>,
    pub reactors: Arc<MockReactorFactory>,
    pub storage: Arc<MockStorageFactory>,
    pub local_server: ServerId,
    pub local_peer: PeerId,

    /// Keeps the per-test base path alive for the driver's lifetime.
    _base_dir: tempfile::TempDir,
    tables: TableConfigMap,
    names: NameMap,
    peers: PeerMap,
    tables_tx: watch::Sender<TableConfigMap>,
    names_tx: watch::Sender<NameMap>,
    peers_tx: watch::Sender<PeerMap>,
    removed_tx: watch::Sender<bool>,
}

impl TestCluster {
    /// Build a cluster whose identity maps already contain the local node,
    /// and a driver wired to it. `init_delay` slows mock reactor
    /// construction to widen race windows.
    pub fn start(init_delay: Duration) -> (Self, ReactorDriver) {
        super::init_tracing();
        let base_dir = tempfile::tempdir().expect("create test base path");
        let log = new_log();
        let directory = Arc::new(DirectoryMap::new());
        let reactors = Arc::new(MockReactorFactory::new(
            Arc::clone(&log),
            Arc::clone(&directory),
            init_delay,
        ));
        let storage = Arc::new(MockStorageFactory::new(Arc::clone(&log)));

        let local_server = ServerId::new();
        let local_peer = PeerId::new();
        let mut names = NameMap::new();
        names
            .entry("local".to_string())
            .or_default()
            .insert(local_server);
        let mut peers = PeerMap::new();
        peers.insert(local_server, local_peer);

        let (tables_tx, tables_rx) = watch::channel(TableConfigMap::new());
        let (names_tx, names_rx) = watch::channel(names.clone());
        let (peers_tx, peers_rx) = watch::channel(peers.clone());
        let (removed_tx, removed_rx) = watch::channel(false);

        let driver = ReactorDriver::new(
            base_dir.path().to_path_buf(),
            IoBackend::default(),
            local_peer,
            storage_factory_handle(&storage),
            reactor_factory_handle(&reactors),
            Arc::clone(&directory),
            PerfmonRegistry::new(),
            DriverSettings::default(),
            DriverSources {
                tables: tables_rx,
                names: names_rx,
                peers: peers_rx,
                removed: removed_rx,
            },
        );

        let cluster = Self {
            log,
            directory,
            reactors,
            storage,
            local_server,
            local_peer,
            _base_dir: base_dir,
            tables: TableConfigMap::new(),
            names,
            peers,
            tables_tx,
            names_tx,
            peers_tx,
            removed_tx,
        };
        (cluster, driver)
    }

    /// Add a connected server under `name`; publishes both identity maps.
    pub fn add_server(&mut self, name: &str) -> (ServerId, PeerId) {
        let server = ServerId::new();
        let peer = PeerId::new();
        self.names
            .entry(name.to_string())
            .or_default()
            .insert(server);
        self.peers.insert(server, peer);
        self.names_tx.send(self.names.clone()).unwrap();
        self.peers_tx.send(self.peers.clone()).unwrap();
        (server, peer)
    }

    /// Remove a server from both maps entirely (permanent removal).
    pub fn remove_server(&mut self, server: ServerId) {
        for claimants in self.names.values_mut() {
            claimants.remove(&server);
        }
        self.names.retain(|_, claimants| !claimants.is_empty());
        self.peers.remove(&server);
        self.names_tx.send(self.names.clone()).unwrap();
        self.peers_tx.send(self.peers.clone()).unwrap();
    }

    /// Set one table's config entry and publish the map.
    pub fn set_table(&mut self, table: TableId, state: TableConfigState) {
        self.tables.insert(table, state);
        self.tables_tx.send(self.tables.clone()).unwrap();
    }

    /// Fire this node's permanent-removal signal.
    pub fn mark_removed(&self) {
        self.removed_tx.send(true).unwrap();
    }
}
