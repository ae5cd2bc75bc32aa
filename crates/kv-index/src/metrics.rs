use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe operation counters. Purely observational: nothing in the
/// table's behavior depends on these values.
#[derive(Debug, Default)]
pub struct Metrics {
    sets: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
    upsizes: AtomicU64,
    reclamations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upsize(&self) {
        self.upsizes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclamation(&self) {
        self.reclamations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sets: self.sets.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            upsizes: self.upsizes.load(Ordering::Relaxed),
            reclamations: self.reclamations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Metrics`], safe to hand out without holding any
/// reference into the live table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sets: u64,
    pub gets: u64,
    pub deletes: u64,
    pub upsizes: u64,
    pub reclamations: u64,
}
