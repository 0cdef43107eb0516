// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Drain coordination for deferred teardown tasks.
//!
//! Agent destruction can suspend, so the reconciliation pass hands each
//! doomed agent to an independently scheduled task instead of tearing it
//! down inline. Those tasks borrow driver-owned collaborators (the storage
//! factory, the directory map), so the driver must not be dropped while any
//! of them is still running.
//!
//! [`DrainCoordinator`] is the counted tracker that makes this safe: every
//! teardown task holds a [`DrainToken`]; [`DrainCoordinator::drain`]
//! resolves once every token has been dropped. The driver drains as the
//! last step of its own shutdown.

use crate::metrics;
use tokio::sync::watch;

/// Tracks outstanding asynchronous teardown tasks.
#[derive(Debug)]
pub struct DrainCoordinator {
    count: watch::Sender<usize>,
}

impl Default for DrainCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainCoordinator {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Issue a token representing one in-flight task.
    pub fn token(&self) -> DrainToken {
        self.count.send_modify(|c| *c += 1);
        metrics::set_teardowns_in_flight(*self.count.borrow());
        DrainToken {
            count: self.count.clone(),
        }
    }

    /// Number of tokens currently outstanding.
    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until every outstanding token has been dropped.
    ///
    /// Tokens issued after `drain` begins are waited on too; this is a
    /// shutdown barrier, not a snapshot.
    pub async fn drain(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so `wait_for` cannot see it close.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

/// Token held by one in-flight teardown task.
///
/// Dropping the token marks the task complete. Cloning issues a fresh
/// token, so a task may be split without undercounting.
#[derive(Debug)]
pub struct DrainToken {
    count: watch::Sender<usize>,
}

impl Clone for DrainToken {
    fn clone(&self) -> Self {
        self.count.send_modify(|c| *c += 1);
        metrics::set_teardowns_in_flight(*self.count.borrow());
        Self {
            count: self.count.clone(),
        }
    }
}

impl Drop for DrainToken {
    fn drop(&mut self) {
        self.count.send_modify(|c| *c -= 1);
        metrics::set_teardowns_in_flight(*self.count.borrow());
    }
}
