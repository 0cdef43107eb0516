//! Declarative table configuration.
//!
//! This module defines the cluster-wide configuration types the driver
//! consumes. A table's replication layout is declared per shard: one
//! designated primary (the director) plus a replica set, with a shard
//! scheme carving the key space into one contiguous region per shard.
//!
//! Config arrives through a reactive view keyed by table id; each entry is
//! either present-with-config or a deletion tombstone. The driver never
//! mutates configuration, it only observes it.
//!
//! # Example
//!
//! ```rust
//! use reactor_driver::config::{ShardConfig, ShardScheme, TableReplicationConfig};
//! use reactor_driver::identity::ServerId;
//!
//! let director = ServerId::new();
//! let replica = ServerId::new();
//!
//! let repl = TableReplicationConfig {
//!     config: vec![ShardConfig::new(director, [director, replica])].into(),
//!     scheme: ShardScheme::unsharded(),
//! };
//! assert!(repl.validate().is_ok());
//! ```

use crate::error::{DriverError, Result};
use crate::identity::{ServerId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// One contiguous half-open key range `[left, right)`.
///
/// `right = None` means the range is unbounded above. Regions are totally
/// ordered so they can key the role map inside a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: String,
    pub right: Option<String>,
}

impl Region {
    /// Whether `key` falls inside this region.
    pub fn contains(&self, key: &str) -> bool {
        key >= self.left.as_str()
            && match &self.right {
                Some(right) => key < right.as_str(),
                None => true,
            }
    }
}

/// Replication layout of one shard: a director plus replicas.
///
/// The director is the server designated primary for the shard's region.
/// The replica set may or may not include the director; role assignment
/// gives director precedence either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub director: ServerId,
    pub replicas: BTreeSet<ServerId>,
}

impl ShardConfig {
    pub fn new(director: ServerId, replicas: impl IntoIterator<Item = ServerId>) -> Self {
        Self {
            director,
            replicas: replicas.into_iter().collect(),
        }
    }
}

/// Ordered shard descriptors for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub shards: Vec<ShardConfig>,
}

impl From<Vec<ShardConfig>> for TableConfig {
    fn from(shards: Vec<ShardConfig>) -> Self {
        Self { shards }
    }
}

/// Partition of the key space into contiguous regions, one per shard.
///
/// `n` split points produce `n + 1` regions. Split points must be strictly
/// increasing; [`TableReplicationConfig::validate`] enforces this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardScheme {
    split_points: Vec<String>,
}

impl ShardScheme {
    /// A scheme with a single region covering the whole key space.
    pub fn unsharded() -> Self {
        Self {
            split_points: Vec::new(),
        }
    }

    /// Build a scheme from split points.
    pub fn with_split_points(split_points: impl IntoIterator<Item = String>) -> Self {
        Self {
            split_points: split_points.into_iter().collect(),
        }
    }

    /// Number of regions this scheme produces.
    pub fn shard_count(&self) -> usize {
        self.split_points.len() + 1
    }

    /// The key range of shard `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= shard_count()`; callers iterate `0..shard_count()`.
    pub fn region(&self, index: usize) -> Region {
        assert!(index < self.shard_count(), "shard index out of range");
        let left = if index == 0 {
            String::new()
        } else {
            self.split_points[index - 1].clone()
        };
        let right = self.split_points.get(index).cloned();
        Region { left, right }
    }

    /// All regions in shard order.
    pub fn regions(&self) -> Vec<Region> {
        (0..self.shard_count()).map(|i| self.region(i)).collect()
    }

    fn split_points_increasing(&self) -> bool {
        self.split_points.windows(2).all(|w| w[0] < w[1])
            && self.split_points.first().map_or(true, |p| !p.is_empty())
    }
}

/// A table's full declared replication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReplicationConfig {
    pub config: TableConfig,
    pub scheme: ShardScheme,
}

impl TableReplicationConfig {
    /// Check the config/scheme pairing.
    ///
    /// The number of shards in the config must equal the number of regions
    /// in the scheme, and split points must be strictly increasing.
    pub fn validate(&self) -> Result<()> {
        if self.config.shards.len() != self.scheme.shard_count() {
            return Err(DriverError::Config(format!(
                "{} shards declared but scheme has {} regions",
                self.config.shards.len(),
                self.scheme.shard_count()
            )));
        }
        if !self.scheme.split_points_increasing() {
            return Err(DriverError::Config(
                "split points must be non-empty and strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// A single-shard config for tests.
    pub fn for_testing(director: ServerId, replicas: impl IntoIterator<Item = ServerId>) -> Self {
        Self {
            config: vec![ShardConfig::new(director, replicas)].into(),
            scheme: ShardScheme::unsharded(),
        }
    }
}

/// One entry in the reactive table-config view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableConfigState {
    /// Table exists with this configuration.
    Present(TableReplicationConfig),
    /// Table was deleted; the tombstone sticks around so the driver can
    /// observe the transition.
    Deleted,
}

impl TableConfigState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// The full reactive table-config view, keyed by table id.
pub type TableConfigMap = BTreeMap<TableId, TableConfigState>;

/// Tunable driver behavior.
///
/// Durations are declared as strings ("10s", "500ms") so the settings can
/// come straight out of YAML/JSON config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Warn if an asynchronous agent teardown takes longer than this.
    /// Teardown is never cancelled; this only controls logging.
    #[serde(default = "default_teardown_warn_after")]
    pub teardown_warn_after: String,
}

fn default_teardown_warn_after() -> String {
    "10s".to_string()
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            teardown_warn_after: default_teardown_warn_after(),
        }
    }
}

impl DriverSettings {
    /// Parse `teardown_warn_after` to a Duration.
    pub fn teardown_warn_after_duration(&self) -> Duration {
        humantime::parse_duration(&self.teardown_warn_after)
            .unwrap_or(Duration::from_secs(10))
    }
}
