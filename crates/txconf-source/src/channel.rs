use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{EventKind, SourceError, SourceResult};
use crate::event::{BlockEvent, ChaincodeEvent, EventFilter};
use crate::traits::{BlockStream, ChaincodeStream, LedgerEventSource};

struct BlockSubscriber {
    after_block: Option<u64>,
    sender: mpsc::Sender<BlockEvent>,
}

impl BlockSubscriber {
    fn matches(&self, event: &BlockEvent) -> bool {
        match (self.after_block, event.number()) {
            (Some(after), Some(number)) => number > after,
            _ => true,
        }
    }
}

struct ChaincodeSubscriber {
    filter: EventFilter,
    sender: mpsc::Sender<ChaincodeEvent>,
}

/// In-process ledger source that fans published events out to subscribers.
///
/// Each subscription gets its own bounded channel. Publishing waits for
/// channel capacity, so a slow subscriber applies backpressure to the
/// publisher. Subscribers whose receivers were dropped are pruned on the
/// next publish.
pub struct ChannelEventSource {
    blocks: Mutex<Vec<BlockSubscriber>>,
    chaincode: Mutex<Vec<ChaincodeSubscriber>>,
    capacity: usize,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelEventSource {
    /// Create a source whose subscription channels hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            chaincode: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a block event to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish_block(&self, event: BlockEvent) -> usize {
        let targets: Vec<_> = lock(&self.blocks)
            .iter()
            .filter(|sub| sub.matches(&event))
            .map(|sub| sub.sender.clone())
            .collect();

        let mut delivered = 0;
        for sender in targets {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        lock(&self.blocks).retain(|sub| !sub.sender.is_closed());
        debug!(number = ?event.number(), delivered, "block event published");
        delivered
    }

    /// Deliver a chaincode event to every subscriber whose filter matches.
    pub async fn publish_chaincode(&self, event: ChaincodeEvent) -> usize {
        let targets: Vec<_> = lock(&self.chaincode)
            .iter()
            .filter(|sub| sub.filter.matches(&event))
            .map(|sub| sub.sender.clone())
            .collect();

        let mut delivered = 0;
        for sender in targets {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        lock(&self.chaincode).retain(|sub| !sub.sender.is_closed());
        debug!(block = event.block_number, delivered, "chaincode event published");
        delivered
    }

    /// End every open subscription and refuse new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.blocks).clear();
        lock(&self.chaincode).clear();
    }

    /// Number of live subscriptions across both streams.
    pub fn subscriber_count(&self) -> usize {
        let blocks = lock(&self.blocks).iter().filter(|s| !s.sender.is_closed()).count();
        let chaincode = lock(&self.chaincode)
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count();
        blocks + chaincode
    }

    fn ensure_open(&self, kind: EventKind) -> SourceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SourceError::Subscription {
                kind,
                reason: "source is closed".into(),
            });
        }
        Ok(())
    }
}

impl Default for ChannelEventSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl LedgerEventSource for ChannelEventSource {
    async fn block_events(&self, after_block: Option<u64>) -> SourceResult<BlockStream> {
        self.ensure_open(EventKind::Block)?;
        let (sender, receiver) = mpsc::channel(self.capacity);
        lock(&self.blocks).push(BlockSubscriber {
            after_block,
            sender,
        });
        Ok(receiver)
    }

    async fn chaincode_events(&self, filter: EventFilter) -> SourceResult<ChaincodeStream> {
        self.ensure_open(EventKind::Chaincode)?;
        if filter.chaincode_name.is_empty() {
            return Err(SourceError::Subscription {
                kind: EventKind::Chaincode,
                reason: "chaincode name must not be empty".into(),
            });
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        lock(&self.chaincode).push(ChaincodeSubscriber { filter, sender });
        Ok(receiver)
    }
}

impl std::fmt::Debug for ChannelEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEventSource")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
