use txconf_cache::{HeaderCache, PendingTable};

use crate::stats::{CorrelatorStats, StatsSnapshot};

/// The correlation state owned by one service instance and shared with its
/// workers.
#[derive(Debug)]
pub struct CorrelationState {
    pub headers: HeaderCache,
    pub pending: PendingTable,
    pub stats: CorrelatorStats,
}

impl CorrelationState {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            headers: HeaderCache::new(cache_capacity),
            pending: PendingTable::new(),
            stats: CorrelatorStats::default(),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.headers.len(), self.pending.len())
    }
}
