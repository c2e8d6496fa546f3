use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CorrelatorResult;
use crate::state::CorrelationState;
use crate::worker::Worker;

/// Periodically logs the service counters.
pub struct StatusReporter {
    state: Arc<CorrelationState>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(state: Arc<CorrelationState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    pub fn report(&self) {
        let s = self.state.snapshot();
        info!(
            blocks = s.blocks_received,
            block_errors = s.block_errors,
            events = s.events_received,
            event_errors = s.event_errors,
            overwritten = s.overwritten,
            confirmed = s.confirmed,
            error_txid = s.error_txid,
            error_header = s.error_header,
            stalled = s.stalled,
            evicted = s.evicted,
            flushed_on_shutdown = s.flushed_on_shutdown,
            cached = s.cached_headers,
            pending = s.pending_records,
            "status"
        );
    }
}

#[async_trait]
impl Worker for StatusReporter {
    const NAME: &'static str = "status-reporter";

    async fn run(self, cancel: CancellationToken) -> CorrelatorResult<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.report(),
            }
        }
        Ok(())
    }
}
