//! Server-wide counters.
//!
//! All counters are monotone atomics updated with relaxed adds; reads
//! produce a consistent-enough snapshot for operational use. The
//! process epoch here is the base for every monotonic millisecond
//! timestamp in the pool and agents.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

static PROCESS_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the process epoch. Monotonic, never wall-clock.
pub fn monotonic_ms() -> u64 {
    PROCESS_EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

#[derive(Debug, Default)]
pub struct ServerStats {
    pub packets_received: AtomicU64,
    pub responses_sent: AtomicU64,
    pub decode_errors: AtomicU64,
    pub auth_failures: AtomicU64,
    pub dropped_backpressure: AtomicU64,
    pub capacity_drops: AtomicU64,
    pub unknown_port_drops: AtomicU64,
    pub handler_timeouts: AtomicU64,
    pub fault_drops: AtomicU64,
    pub get_requests: AtomicU64,
    pub get_next_requests: AtomicU64,
    pub get_bulk_requests: AtomicU64,
    pub set_requests: AtomicU64,
    pub hot_path_hits: AtomicU64,
}

impl ServerStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            packets_received: read(&self.packets_received),
            responses_sent: read(&self.responses_sent),
            decode_errors: read(&self.decode_errors),
            auth_failures: read(&self.auth_failures),
            dropped_backpressure: read(&self.dropped_backpressure),
            capacity_drops: read(&self.capacity_drops),
            unknown_port_drops: read(&self.unknown_port_drops),
            handler_timeouts: read(&self.handler_timeouts),
            fault_drops: read(&self.fault_drops),
            get_requests: read(&self.get_requests),
            get_next_requests: read(&self.get_next_requests),
            get_bulk_requests: read(&self.get_bulk_requests),
            set_requests: read(&self.set_requests),
            hot_path_hits: read(&self.hot_path_hits),
        }
    }
}

/// Point-in-time copy of the server counters, JSON-serializable for
/// the control API.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub responses_sent: u64,
    pub decode_errors: u64,
    pub auth_failures: u64,
    pub dropped_backpressure: u64,
    pub capacity_drops: u64,
    pub unknown_port_drops: u64,
    pub handler_timeouts: u64,
    pub fault_drops: u64,
    pub get_requests: u64,
    pub get_next_requests: u64,
    pub get_bulk_requests: u64,
    pub set_requests: u64,
    pub hot_path_hits: u64,
}
