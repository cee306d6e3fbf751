//! Per-handle I/O counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by a store as it works. Share one `Arc<IoStats>` across
/// handles to aggregate, or give each handle its own.
#[derive(Debug, Default)]
pub struct IoStats {
    expands: AtomicU64,
    resyncs: AtomicU64,
    direct_borrows: AtomicU64,
    shadow_borrows: AtomicU64,
    commits: AtomicU64,
}

/// Point-in-time copy of [`IoStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful `expand` calls.
    pub expands: u64,
    /// Times the bounds tracker adopted a larger backing size and remapped.
    pub resyncs: u64,
    /// Borrows served straight from the mapping.
    pub direct_borrows: u64,
    /// Borrows served from a heap shadow buffer.
    pub shadow_borrows: u64,
    /// Write views committed.
    pub commits: u64,
}

impl IoStats {
    pub(crate) fn add_expand(&self) {
        self.expands.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_direct(&self) {
        self.direct_borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_shadow(&self) {
        self.shadow_borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            expands: self.expands.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            direct_borrows: self.direct_borrows.load(Ordering::Relaxed),
            shadow_borrows: self.shadow_borrows.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}
