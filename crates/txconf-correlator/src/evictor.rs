use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CorrelatorResult;
use crate::state::CorrelationState;
use crate::stats::CorrelatorStats;
use crate::worker::Worker;

/// Keeps the header cache within its bound, oldest block first.
pub struct CacheEvictor {
    state: Arc<CorrelationState>,
    tick: Duration,
}

impl CacheEvictor {
    pub fn new(state: Arc<CorrelationState>, tick: Duration) -> Self {
        Self { state, tick }
    }

    /// Evict until the cache is back within its bound. Returns the evicted
    /// block numbers in eviction order.
    pub fn run_cycle(&self) -> Vec<u64> {
        let evicted = self.state.headers.enforce_bound();
        if !evicted.is_empty() {
            CorrelatorStats::add(&self.state.stats.evicted, evicted.len() as u64);
            debug!(
                evicted = ?evicted,
                cached = self.state.headers.len(),
                "block headers evicted"
            );
        }
        evicted
    }
}

#[async_trait]
impl Worker for CacheEvictor {
    const NAME: &'static str = "cache-evictor";

    async fn run(self, cancel: CancellationToken) -> CorrelatorResult<()> {
        let mut headers_rx = self.state.headers.subscribe();
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(capacity = self.state.headers.capacity(), "cache evictor started");
        loop {
            self.run_cycle();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = headers_rx.changed() => {}
                _ = tick.tick() => {}
            }
        }
        info!("cache evictor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txconf_types::BlockHeader;

    fn header(n: u64) -> BlockHeader {
        BlockHeader::new(n, format!("h{n}"), format!("h{}", n.saturating_sub(1)), 0)
    }

    #[test]
    fn cycle_evicts_lowest_numbers() {
        let state = Arc::new(CorrelationState::new(2));
        for n in [10, 11, 12] {
            state.headers.insert(header(n));
        }
        let evictor = CacheEvictor::new(state.clone(), Duration::from_millis(10));
        assert_eq!(evictor.run_cycle(), vec![10]);
        assert_eq!(state.headers.numbers(), vec![11, 12]);
        assert_eq!(state.snapshot().evicted, 1);
        assert!(evictor.run_cycle().is_empty());
    }

    #[tokio::test]
    async fn worker_keeps_cache_bounded() {
        let state = Arc::new(CorrelationState::new(3));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            CacheEvictor::new(state.clone(), Duration::from_millis(5)).run(cancel.clone()),
        );

        for n in 1..=10 {
            state.headers.insert(header(n));
        }
        while state.headers.len() > 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(state.headers.numbers(), vec![8, 9, 10]);
    }
}
