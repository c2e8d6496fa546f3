use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use txconf_cache::PendingEntry;
use txconf_sink::{RecordSink, SinkResult};
use txconf_types::{ConfirmStatus, OutputRecord, PendingRecord};

use crate::encoder::HeaderEncoder;
use crate::error::CorrelatorResult;
use crate::state::CorrelationState;
use crate::stats::CorrelatorStats;
use crate::worker::Worker;

/// Terminal records written and records flagged during one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub flushed: usize,
    pub stalled: usize,
}

/// Resolves pending records against the header cache.
///
/// Each pass snapshots the pending entries, then resolves each one on its
/// own: a malformed transaction id is rejected without consulting the cache,
/// a cached header confirms the record, and anything else stays pending.
/// Resolutions go through [`txconf_cache::PendingTable::resolve`] with the
/// snapshot revision, so an entry overwritten mid-pass is left for the next
/// pass and a record is never written twice.
pub struct Correlator {
    state: Arc<CorrelationState>,
    sink: Arc<dyn RecordSink>,
    encoder: Arc<dyn HeaderEncoder>,
    tick: Duration,
}

impl Correlator {
    pub fn new(
        state: Arc<CorrelationState>,
        sink: Arc<dyn RecordSink>,
        encoder: Arc<dyn HeaderEncoder>,
        tick: Duration,
    ) -> Self {
        Self {
            state,
            sink,
            encoder,
            tick,
        }
    }

    /// Run one pass over every pending entry.
    ///
    /// A sink failure aborts the pass; the record being written is already
    /// out of the table and is logged instead.
    pub fn run_pass(&self) -> SinkResult<PassOutcome> {
        let mut outcome = PassOutcome::default();
        let entries = self.state.pending.pending_entries();
        if entries.is_empty() {
            return Ok(outcome);
        }

        // Read before the lookup so a header inserted in between cannot make
        // a resolvable entry look stalled.
        let highest_seen = self.state.headers.highest_seen();
        let wanted = entries
            .iter()
            .filter(|entry| entry.tx_id.is_well_formed())
            .map(|entry| entry.block_ref);
        let headers = self.state.headers.get_many(wanted);

        for entry in &entries {
            if let Err(e) = entry.tx_id.validate() {
                let reason = e.to_string();
                if let Some(record) = self.resolve(entry, |r| r.reject_tx_id(reason)) {
                    self.flush(&record)?;
                    outcome.flushed += 1;
                }
                continue;
            }

            match headers.get(&entry.block_ref) {
                Some(header) => {
                    let resolved = match self.encoder.encode(header) {
                        Ok(json) => self.resolve(entry, |r| r.confirm(json)),
                        Err(e) => {
                            let reason = e.to_string();
                            self.resolve(entry, |r| r.reject_header(reason))
                        }
                    };
                    if let Some(record) = resolved {
                        self.flush(&record)?;
                        outcome.flushed += 1;
                    }
                }
                None => {
                    let unreachable = highest_seen.is_some_and(|h| entry.block_ref <= h);
                    if unreachable && !entry.stalled && self.mark_stalled(entry, highest_seen) {
                        outcome.stalled += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    fn resolve<F>(&self, entry: &PendingEntry, transition: F) -> Option<PendingRecord>
    where
        F: FnOnce(&mut PendingRecord) -> bool,
    {
        self.state
            .pending
            .resolve(&entry.tx_id, entry.revision, transition)
    }

    fn mark_stalled(&self, entry: &PendingEntry, highest_seen: Option<u64>) -> bool {
        if !self.state.pending.mark_stalled(&entry.tx_id, entry.revision) {
            return false;
        }
        CorrelatorStats::incr(&self.state.stats.stalled);
        warn!(
            tx_id = %entry.tx_id,
            block = entry.block_ref,
            highest_seen = highest_seen.unwrap_or_default(),
            lowest_cached = self.state.headers.lowest_cached().unwrap_or_default(),
            "block header no longer cached; record will stay pending until shutdown"
        );
        true
    }

    fn flush(&self, record: &PendingRecord) -> SinkResult<()> {
        let stats = &self.state.stats;
        let output = OutputRecord::from(record);
        if let Err(e) = self.sink.write(&output) {
            error!(error = %e, line = %output.to_line(), "failed to write confirmation");
            return Err(e);
        }
        match record.status {
            ConfirmStatus::Confirmed => CorrelatorStats::incr(&stats.confirmed),
            ConfirmStatus::ErrorTxId => CorrelatorStats::incr(&stats.error_txid),
            ConfirmStatus::ErrorHeader => CorrelatorStats::incr(&stats.error_header),
            ConfirmStatus::Pending => {}
        }
        debug!(
            tx_id = %record.tx_id(),
            status = %record.status,
            block = record.block_ref,
            "record flushed"
        );
        Ok(())
    }
}

#[async_trait]
impl Worker for Correlator {
    const NAME: &'static str = "correlator";

    async fn run(self, cancel: CancellationToken) -> CorrelatorResult<()> {
        let mut headers_rx = self.state.headers.subscribe();
        let mut pending_rx = self.state.pending.subscribe();
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_ms = self.tick.as_millis() as u64, "correlator started");
        while !cancel.is_cancelled() {
            self.run_pass()?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = headers_rx.changed() => {}
                _ = pending_rx.changed() => {}
                _ = tick.tick() => {}
            }
        }
        info!("correlator stopped");
        Ok(())
    }
}
