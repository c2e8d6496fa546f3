use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use txconf_source::{BlockEvent, BlockStream, ChaincodeEvent, ChaincodeStream, Checkpointer};
use txconf_source::{EventKind, SourceError};

use crate::error::CorrelatorResult;
use crate::state::CorrelationState;
use crate::stats::CorrelatorStats;
use crate::worker::Worker;

/// Consumes block-commit notifications into the header cache.
pub struct BlockListener {
    stream: BlockStream,
    state: Arc<CorrelationState>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl BlockListener {
    pub fn new(
        stream: BlockStream,
        state: Arc<CorrelationState>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            stream,
            state,
            checkpointer,
        }
    }

    /// Extract and cache one block header. Extraction failures are counted
    /// and the event is dropped; the ledger will not resend it.
    pub fn handle(&self, event: BlockEvent) {
        let stats = &self.state.stats;
        CorrelatorStats::incr(&stats.blocks_received);

        match event.extract_header() {
            Ok(header) => {
                let number = header.number;
                if self.state.headers.insert(header).is_some() {
                    debug!(block = number, "block header replaced");
                }
                self.checkpointer.record_block(number);
                debug!(block = number, cached = self.state.headers.len(), "block header cached");
            }
            Err(e) => {
                CorrelatorStats::incr(&stats.block_errors);
                if let Some(number) = event.number() {
                    self.checkpointer.record_block(number);
                }
                warn!(error = %e, "block event dropped");
            }
        }
    }
}

#[async_trait]
impl Worker for BlockListener {
    const NAME: &'static str = "block-listener";

    async fn run(mut self, cancel: CancellationToken) -> CorrelatorResult<()> {
        info!("block listener started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.stream.recv() => match event {
                    Some(event) => self.handle(event),
                    None => return Err(SourceError::StreamClosed(EventKind::Block).into()),
                },
            }
        }
        info!("block listener stopped");
        Ok(())
    }
}

/// Consumes chaincode events into the pending correlation table.
pub struct EventListener {
    stream: ChaincodeStream,
    state: Arc<CorrelationState>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl EventListener {
    pub fn new(
        stream: ChaincodeStream,
        state: Arc<CorrelationState>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            stream,
            state,
            checkpointer,
        }
    }

    /// Extract a pending record from one chaincode event and insert it.
    ///
    /// An existing entry with the same transaction id is overwritten and
    /// discarded without being flushed.
    pub fn handle(&self, event: ChaincodeEvent) {
        let stats = &self.state.stats;
        CorrelatorStats::incr(&stats.events_received);

        let record = match event.extract_record() {
            Ok(record) => record,
            Err(e) => {
                CorrelatorStats::incr(&stats.event_errors);
                warn!(block = event.block_number, error = %e, "chaincode event dropped");
                return;
            }
        };

        let tx_id = record.tx_id().clone();
        let block = record.block_ref;
        if let Some(previous) = self.state.pending.insert(record) {
            CorrelatorStats::incr(&stats.overwritten);
            warn!(
                tx_id = %tx_id,
                previous_block = previous.block_ref,
                block,
                "pending record overwritten by a later event with the same transaction id"
            );
        }
        self.checkpointer.record_chaincode(block, tx_id.as_str());
        debug!(tx_id = %tx_id, block, "pending record added");
    }
}

#[async_trait]
impl Worker for EventListener {
    const NAME: &'static str = "event-listener";

    async fn run(mut self, cancel: CancellationToken) -> CorrelatorResult<()> {
        info!("event listener started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.stream.recv() => match event {
                    Some(event) => self.handle(event),
                    None => return Err(SourceError::StreamClosed(EventKind::Chaincode).into()),
                },
            }
        }
        info!("event listener stopped");
        Ok(())
    }
}
