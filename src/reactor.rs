// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reactor construction contract.
//!
//! The reactor is the per-table replication/backfill state machine. Its
//! internals live elsewhere; this module defines exactly what the driver
//! needs from it:
//!
//! - A [`ReactorFactory`] builds a reactor bound to a storage handle and a
//!   reactively observed blueprint (a `watch::Receiver`, not a snapshot).
//! - A running [`Reactor`] exposes its externally visible directory state
//!   as a watch channel, which the agent republishes into the process-wide
//!   directory map.
//! - [`Reactor::stop`] consumes the reactor; the agent calls it only after
//!   the directory exporter is gone, because the exporter's receiver
//!   borrows from the reactor's internal watch sender.
//!
//! The trait uses boxed futures rather than `async fn` so trait objects can
//! cross the factory seam, the same shape the storage seam uses.

use crate::blueprint::{Blueprint, Role};
use crate::config::Region;
use crate::error::Result;
use crate::identity::{PeerId, TableId};
use crate::metrics::TableCollections;
use crate::storage::TableStorage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Type alias for boxed async futures crossing the factory seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Externally visible directory state of one reactor.
///
/// Peers read this to discover what role this node currently plays for the
/// table. The reactor updates it as it works through the blueprint; the
/// driver treats it as opaque data to republish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorDirectory {
    /// Current activity per region, as reported by the reactor itself.
    /// Kept as a pair list so the whole structure stays wire-serializable.
    pub activities: Vec<(Region, Role)>,
}

impl ReactorDirectory {
    /// The reported activity for `region`, if any.
    pub fn activity(&self, region: &Region) -> Option<Role> {
        self.activities
            .iter()
            .find(|(r, _)| r == region)
            .map(|(_, role)| *role)
    }
}

/// Durability requirement for replicated writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteDurability {
    /// Acknowledge once the write is on disk.
    Hard,
    /// Acknowledge from memory.
    Soft,
}

/// Policy callbacks the reactor consults while replicating.
pub trait AckPolicy: Send + Sync + 'static {
    /// Whether this set of acknowledging peers is sufficient to report a
    /// write as done.
    fn is_acceptable_ack_set(&self, acks: &BTreeSet<PeerId>) -> bool;

    /// Durability required when replicating to `peer`.
    fn write_durability(&self, peer: &PeerId) -> WriteDurability;
}

/// Placeholder policy until a configurable consistency-level mechanism
/// exists: any non-empty ack set is sufficient, and writes are always hard.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveAckPolicy;

impl AckPolicy for PermissiveAckPolicy {
    fn is_acceptable_ack_set(&self, acks: &BTreeSet<PeerId>) -> bool {
        !acks.is_empty()
    }

    fn write_durability(&self, _peer: &PeerId) -> WriteDurability {
        WriteDurability::Hard
    }
}

/// Everything a factory needs to build one table's reactor.
pub struct ReactorContext {
    pub table: TableId,
    /// The blueprint as a live view; the reactor re-reads it on change
    /// rather than holding a snapshot.
    pub blueprint: watch::Receiver<Blueprint>,
    /// The table's storage handle, owned by the agent for the reactor's
    /// whole lifetime.
    pub storage: Arc<TableStorage>,
    pub collections: TableCollections,
    pub ack_policy: Arc<dyn AckPolicy>,
    pub base_path: PathBuf,
    /// This node's own peer id.
    pub local_peer: PeerId,
}

/// A running per-table reactor.
pub trait Reactor: Send + Sync {
    /// The reactor's live directory state.
    ///
    /// The returned receiver borrows from the reactor's internal sender and
    /// is only valid while the reactor exists; the agent's teardown order
    /// guarantees no subscriber outlives it.
    fn directory(&self) -> watch::Receiver<ReactorDirectory>;

    /// Stop the reactor, consuming it. Resolves once the replication state
    /// machine has fully wound down.
    fn stop(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Builds reactors; implemented by the replication subsystem.
pub trait ReactorFactory: Send + Sync + 'static {
    fn build(&self, ctx: ReactorContext) -> BoxFuture<'_, Result<Box<dyn Reactor>>>;
}
