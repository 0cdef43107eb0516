//! # Reactor Driver
//!
//! The control-plane component of a distributed database node that turns
//! cluster-wide declarative table configuration into live per-table
//! replication reactors, and keeps them matching as configuration changes
//! arrive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                             reactor-driver                               │
//! │                                                                          │
//! │  config / identity      ┌───────────────┐      ┌──────────────────────┐  │
//! │  watch channels ───────►│ ReactorDriver │─────►│ construct_blueprint  │  │
//! │  (tables, names,        │ (on_change)   │      │ (IdTranslator)       │  │
//! │   peers, removed)       └──────┬────────┘      └──────────────────────┘  │
//! │                                │ owns                                    │
//! │                                ▼                                         │
//! │                     ┌─────────────────────┐       ┌───────────────────┐  │
//! │                     │ TableAgent (per     │──────►│ DirectoryMap      │  │
//! │                     │ table: reactor +    │       │ (process-wide,    │  │
//! │                     │ storage + exporter) │       │ read by peers)    │  │
//! │                     └──────────┬──────────┘       └───────────────────┘  │
//! │                                │ deferred teardown                       │
//! │                                ▼                                         │
//! │                     ┌─────────────────────┐                              │
//! │                     │ DrainCoordinator    │                              │
//! │                     └─────────────────────┘                              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle rules
//!
//! - **Reconciliation never blocks.** [`ReactorDriver::on_change`] is a
//!   synchronous full scan; anything that can suspend (agent init, agent
//!   teardown) runs in its own task.
//! - **Reconfiguration is in place.** A live table's blueprint is swapped
//!   through a watch channel; the agent, its reactor, and its storage
//!   handle survive.
//! - **Teardown is ordered.** Directory exporter, then reactor, then the
//!   directory entry, then storage — always, enforced by the agent's phase
//!   machine.
//! - **Shutdown drains.** The driver waits for every in-flight teardown
//!   task before it is dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reactor_driver::{DriverSources, ReactorDriver};
//!
//! let driver = ReactorDriver::new(
//!     base_path, io, local_peer,
//!     storage_factory, reactor_factory,
//!     directory, perfmon, settings, sources,
//! );
//! driver.run(stop_rx).await;
//! ```

pub mod agent;
pub mod blueprint;
pub mod config;
pub mod directory;
pub mod drain;
pub mod driver;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod reactor;
pub mod storage;

// Re-exports for convenience
pub use agent::{AgentContext, AgentPhase, TableAgent};
pub use blueprint::{construct_blueprint, Blueprint, Role};
pub use config::{
    DriverSettings, Region, ShardConfig, ShardScheme, TableConfig, TableConfigMap,
    TableConfigState, TableReplicationConfig,
};
pub use directory::{DirectoryExporter, DirectoryMap};
pub use drain::{DrainCoordinator, DrainToken};
pub use driver::{DriverSources, DriverStatus, ReactorDriver};
pub use error::{DriverError, Result};
pub use identity::{IdTranslator, IdentitySnapshot, NameMap, PeerId, PeerMap, ServerId, TableId};
pub use crate::metrics::PerfmonRegistry;
pub use reactor::{
    AckPolicy, PermissiveAckPolicy, Reactor, ReactorContext, ReactorDirectory, ReactorFactory,
    WriteDurability,
};
pub use storage::{IoBackend, StorageComponent, StorageFactory, TableStorage};
