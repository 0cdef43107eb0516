//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - Mock reactor and storage factories that record lifecycle events
//! - A small cluster builder wiring the driver to in-test watch channels

pub mod cluster;
pub mod mocks;

pub use cluster::*;
pub use mocks::*;

use std::sync::{Arc, Mutex};

/// Install a test-writer tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Shared, ordered log of lifecycle events across all mocks.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Position of the first event equal to `needle`, if present.
pub fn index_of(log: &EventLog, needle: &str) -> Option<usize> {
    log.lock().unwrap().iter().position(|e| e == needle)
}

/// Number of events starting with `prefix`.
pub fn count_with_prefix(log: &EventLog, prefix: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .count()
}

/// Poll `cond` until it holds, panicking after ~2 seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
