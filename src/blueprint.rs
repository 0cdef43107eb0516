// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Blueprint construction: declared config → concrete role assignment.
//!
//! A blueprint maps every peer to a role for every shard region of one
//! table. It is what the per-table reactor actually consumes; the reactor
//! never sees server ids or raw configuration.
//!
//! # Invariants
//!
//! 1. Every server currently in the cluster identity map is represented by
//!    some peer, even if only with [`Role::Nothing`] everywhere.
//! 2. The role mapping is total: every peer in the blueprint has an
//!    explicit role for every region.
//! 3. Every region has exactly one [`Role::Primary`]. When the director was
//!    permanently removed, that primary is a freshly synthesized placeholder
//!    peer, so the region correctly reads as having no live primary.
//! 4. A peer is never both primary and secondary for the same region. The
//!    per-(peer, region) single slot makes this structural; director
//!    precedence keeps the director's peer at primary.
//!
//! [`Blueprint::validate`] asserts these after construction. A violation is
//! a programming error and panics; it is never recoverable.
//!
//! Placeholder peer ids make the output nondeterministic in their ids only;
//! the roles of real peers are a pure function of config and identity
//! snapshot.

use crate::config::{Region, TableReplicationConfig};
use crate::error::Result;
use crate::identity::{IdTranslator, IdentitySnapshot, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replication role of one peer for one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Secondary,
    Nothing,
}

/// Assignment of replication roles to peers for one table.
///
/// Structural equality drives change detection: two blueprints compare equal
/// iff every peer holds the same role for every region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blueprint {
    peers_roles: BTreeMap<PeerId, BTreeMap<Region, Role>>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer with no roles yet.
    fn ensure_peer(&mut self, peer: PeerId) {
        self.peers_roles.entry(peer).or_default();
    }

    fn set_role(&mut self, peer: PeerId, region: Region, role: Role) {
        self.peers_roles.entry(peer).or_default().insert(region, role);
    }

    /// Whether `peer` appears in the blueprint at all.
    pub fn contains_peer(&self, peer: &PeerId) -> bool {
        self.peers_roles.contains_key(peer)
    }

    /// The role of `peer` for `region`, if the peer is present.
    pub fn role_of(&self, peer: &PeerId, region: &Region) -> Option<Role> {
        self.peers_roles.get(peer).and_then(|roles| roles.get(region)).copied()
    }

    /// Full role table, peers in id order.
    pub fn peers_roles(&self) -> &BTreeMap<PeerId, BTreeMap<Region, Role>> {
        &self.peers_roles
    }

    /// Peers holding `role` for `region`.
    pub fn peers_with_role(&self, region: &Region, role: Role) -> Vec<PeerId> {
        self.peers_roles
            .iter()
            .filter(|(_, roles)| roles.get(region) == Some(&role))
            .map(|(peer, _)| *peer)
            .collect()
    }

    /// Assert the blueprint invariants over the table's regions.
    ///
    /// # Panics
    ///
    /// Panics on any violation; a bad blueprint is a logic bug, not input
    /// the driver can recover from.
    pub fn validate(&self, regions: &[Region]) {
        for (peer, roles) in &self.peers_roles {
            assert_eq!(
                roles.len(),
                regions.len(),
                "peer {peer} has {} roles for {} regions",
                roles.len(),
                regions.len()
            );
            for region in regions {
                assert!(
                    roles.contains_key(region),
                    "peer {peer} has no role for region {region:?}"
                );
            }
        }
        for region in regions {
            let primaries = self.peers_with_role(region, Role::Primary).len();
            assert_eq!(primaries, 1, "region {region:?} has {primaries} primaries");
        }
    }
}

/// Build the blueprint for one table from its declared configuration and a
/// consistent identity snapshot.
///
/// Fails only with [`crate::error::DriverError::NameCollision`]; the caller
/// must then leave any previously computed blueprint unchanged and retry on
/// a later event. All other outcomes are a valid blueprint or a panic (see
/// [`Blueprint::validate`]).
///
/// # Panics
///
/// Panics if the config's shard count disagrees with its scheme; the caller
/// validates configs before handing them over.
pub fn construct_blueprint(
    repl: &TableReplicationConfig,
    identities: &IdentitySnapshot,
) -> Result<Blueprint> {
    assert_eq!(
        repl.config.shards.len(),
        repl.scheme.shard_count(),
        "shard count / scheme mismatch slipped past config validation"
    );

    let mut trans = IdTranslator::new(identities);
    let mut blueprint = Blueprint::new();
    let regions = repl.scheme.regions();

    // Directors first. A permanently removed director gets a one-off random
    // placeholder (not the translator's cached mapping) so the shard acts as
    // though the primary is simply missing.
    for (shard, region) in repl.config.shards.iter().zip(&regions) {
        let peer = if identities.name_of(&shard.director)?.is_none() {
            PeerId::new()
        } else {
            trans.peer_for(shard.director)
        };
        blueprint.ensure_peer(peer);
        blueprint.set_role(peer, region.clone(), Role::Primary);
    }

    // Replicas. A removed replica contributes nothing; a replica that is
    // also the director keeps its primary slot.
    for (shard, region) in repl.config.shards.iter().zip(&regions) {
        for server in &shard.replicas {
            if identities.name_of(server)?.is_none() {
                continue;
            }
            let peer = trans.peer_for(*server);
            blueprint.ensure_peer(peer);
            if *server != shard.director {
                blueprint.set_role(peer, region.clone(), Role::Secondary);
            }
        }
    }

    // Every connected server must appear, so the reactor will wait for the
    // approval of every known peer before acting.
    for server in identities.server_to_peer().keys() {
        let peer = trans.peer_for(*server);
        blueprint.ensure_peer(peer);
    }

    // Fill the remaining slots so the role mapping is total.
    for region in &regions {
        let unassigned: Vec<PeerId> = blueprint
            .peers_roles
            .iter()
            .filter(|(_, roles)| !roles.contains_key(region))
            .map(|(peer, _)| *peer)
            .collect();
        for peer in unassigned {
            blueprint.set_role(peer, region.clone(), Role::Nothing);
        }
    }

    blueprint.validate(&regions);
    for (server, peer) in identities.server_to_peer() {
        assert!(
            blueprint.contains_peer(peer),
            "known server {server} missing from blueprint"
        );
    }
    Ok(blueprint)
}
