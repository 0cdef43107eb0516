// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the reactor driver.
//!
//! The driver distinguishes two classes of failure:
//!
//! | Error Type | Fatal | Description |
//! |------------------|-------|-------------------------------------------------|
//! | `NameCollision` | No | Two servers share a declared name; skip the table |
//! | `Config` | No | A table's declared config is malformed |
//! | `Storage` | Yes | Storage handle could not be acquired or destroyed |
//! | `Reactor` | Yes | Reactor construction failed |
//! | `InvalidState` | Yes | Agent lifecycle state machine violation |
//!
//! # Propagation policy
//!
//! Non-fatal errors are handled at reconciliation-pass granularity: the
//! affected table keeps its last-known blueprint and is retried on the next
//! triggering event. Fatal errors indicate a logic bug or an unusable
//! environment; the task that hits one logs at error level and panics rather
//! than continuing in a possibly-inconsistent state. Use
//! [`DriverError::is_fatal()`] to classify.

use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while driving per-table reactors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Multiple servers share a declared name.
    ///
    /// Name-based resolution of a server in the table config is ambiguous.
    /// The table's blueprint is left as it was; the operator is expected to
    /// resolve the collision, after which the next config event retries.
    #[error("server name collision: {name:?}")]
    NameCollision { name: String },

    /// A table's declared configuration is malformed.
    ///
    /// For example the shard count does not match the shard scheme.
    #[error("table config error: {0}")]
    Config(String),

    /// Storage handle acquisition or destruction failed.
    ///
    /// Fatal: an agent cannot run without its stores, and a failed destroy
    /// leaves orphaned on-disk state.
    #[error("storage error for table {table}: {message}")]
    Storage { table: String, message: String },

    /// Reactor construction failed.
    ///
    /// Fatal: the table would be live in the config but have no replication
    /// agent, silently.
    #[error("reactor error for table {table}: {message}")]
    Reactor { table: String, message: String },

    /// Agent lifecycle state machine violation.
    ///
    /// Fatal: teardown stages ran out of order, which is a use-after-free
    /// hazard for the directory subscription.
    #[error("invalid agent state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl DriverError {
    /// Check whether this error is fatal.
    ///
    /// Fatal errors terminate the task that observes them; non-fatal errors
    /// are absorbed by the reconciliation pass as a per-table skip.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NameCollision { .. } => false,
            Self::Config(_) => false,
            Self::Storage { .. } => true,
            Self::Reactor { .. } => true,
            Self::InvalidState { .. } => true,
        }
    }
}
