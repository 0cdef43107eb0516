// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cluster identities and the server-to-peer translator.
//!
//! Two kinds of identity coexist in the cluster:
//!
//! - [`ServerId`]: the stable, persisted identity of a cluster member. It
//!   survives disconnection and is never reused.
//! - [`PeerId`]: the ephemeral identity of a reachable connectivity-layer
//!   endpoint. A disconnected server has no peer id.
//!
//! Table configuration is declared in terms of server ids, but the reactor
//! consumes blueprints keyed by peer id. [`IdTranslator`] bridges the gap:
//! for servers with a known peer id it returns that mapping, and for
//! unconnected servers it synthesizes a placeholder peer id so role
//! assignment stays total. Placeholders are cached for the lifetime of one
//! blueprint construction and are never persisted.
//!
//! # Name collisions
//!
//! Servers also carry a declared, human-assigned name. When two servers
//! share a name, name-based resolution is ambiguous and any blueprint built
//! from it would be a guess. [`IdentitySnapshot::name_of`] surfaces this as
//! an error so the reconciliation pass can skip the table until the
//! operator resolves the collision.

use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Stable, persisted identity of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(Uuid);

impl ServerId {
    /// Generate a fresh server id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral identity of a reachable connectivity-layer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Synthesize a fresh peer id.
    ///
    /// Used both by the connectivity layer for real endpoints and by the
    /// translator for placeholders; uniqueness comes from the UUID space.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(Uuid);

impl TableId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for TableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared server name → the servers claiming it.
///
/// A well-formed cluster has exactly one server per name; more than one is
/// a collision the operator must resolve.
pub type NameMap = BTreeMap<String, BTreeSet<ServerId>>;

/// Server id → peer id for currently connected servers.
pub type PeerMap = BTreeMap<ServerId, PeerId>;

/// Point-in-time view of both identity mappings.
///
/// The reconciliation pass captures one snapshot per run so every blueprint
/// built in that run sees a consistent picture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    server_to_peer: PeerMap,
    /// Server → declared name, derived from the name map.
    server_names: BTreeMap<ServerId, String>,
    /// Names claimed by more than one server.
    collided_names: BTreeSet<String>,
}

impl IdentitySnapshot {
    /// Capture a snapshot from the two reactive maps.
    pub fn capture(names: &NameMap, peers: &PeerMap) -> Self {
        let mut server_names = BTreeMap::new();
        let mut collided_names = BTreeSet::new();
        for (name, servers) in names {
            if servers.len() > 1 {
                collided_names.insert(name.clone());
            }
            for server in servers {
                server_names.insert(*server, name.clone());
            }
        }
        Self {
            server_to_peer: peers.clone(),
            server_names,
            collided_names,
        }
    }

    /// The server-to-peer map for currently connected servers.
    pub fn server_to_peer(&self) -> &PeerMap {
        &self.server_to_peer
    }

    /// Whether the server is still part of the cluster.
    ///
    /// A server that was permanently removed no longer carries a declared
    /// name; its entry in table configs is treated as vacated.
    pub fn is_known(&self, server: &ServerId) -> bool {
        self.server_names.contains_key(server)
    }

    /// Resolve a server's declared name.
    ///
    /// Returns `Ok(None)` for a permanently removed server and
    /// `Err(NameCollision)` when the server's name is claimed by more than
    /// one server, in which case the caller must not act on this snapshot.
    pub fn name_of(&self, server: &ServerId) -> Result<Option<&str>> {
        match self.server_names.get(server) {
            None => Ok(None),
            Some(name) => {
                if self.collided_names.contains(name) {
                    Err(DriverError::NameCollision { name: name.clone() })
                } else {
                    Ok(Some(name.as_str()))
                }
            }
        }
    }
}

/// Translates server ids to peer ids for one blueprint construction.
///
/// Connected servers resolve through the snapshot's mapping. Unconnected
/// servers get a synthesized placeholder peer id, cached so the same server
/// resolves to the same placeholder within this call. The cache dies with
/// the translator; placeholders are never reused across constructions.
pub struct IdTranslator {
    map: PeerMap,
}

impl IdTranslator {
    pub fn new(snapshot: &IdentitySnapshot) -> Self {
        Self {
            map: snapshot.server_to_peer().clone(),
        }
    }

    /// Resolve a server id to a peer id, synthesizing a placeholder for
    /// servers with no connected peer. Infallible.
    pub fn peer_for(&mut self, server: ServerId) -> PeerId {
        *self.map.entry(server).or_insert_with(PeerId::new)
    }
}
