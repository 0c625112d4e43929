//! Allocate/release accounting for foreign memory.
//!
//! Keep this cheap: the arena updates it on every allocation. Downstream can
//! export the snapshot to whatever metrics stack the binary uses.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AllocationLedger {
    allocations: AtomicU64,
    releases: AtomicU64,
    failures: AtomicU64,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
}

/// Point-in-time copy of the ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub allocations: u64,
    pub releases: u64,
    pub failures: u64,
    pub live_bytes: usize,
    pub peak_bytes: usize,
}

impl LedgerSnapshot {
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.releases && self.live_bytes == 0
    }
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocate(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::AcqRel);
        let used = self.live_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.record_peak(used);
    }

    pub fn record_release(&self, bytes: usize) {
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Allocator said no; nothing to release later.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::AcqRel);
    }

    fn record_peak(&self, used_bytes: usize) {
        let mut cur = self.peak_bytes.load(Ordering::Relaxed);
        while used_bytes > cur {
            match self.peak_bytes.compare_exchange(
                cur,
                used_bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            used_bytes,
            peak = self.peak_bytes.load(Ordering::Relaxed),
            "foreign mem usage"
        );
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            allocations: self.allocations.load(Ordering::Acquire),
            releases: self.releases.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
            peak_bytes: self.peak_bytes.load(Ordering::Acquire),
        }
    }
}
