use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SourceResult;
use crate::event::{BlockEvent, ChaincodeEvent, EventFilter};

/// Receiving end of a block-event subscription. The stream has ended when
/// `recv()` returns `None`.
pub type BlockStream = mpsc::Receiver<BlockEvent>;

/// Receiving end of a chaincode-event subscription.
pub type ChaincodeStream = mpsc::Receiver<ChaincodeEvent>;

/// A ledger that can be subscribed to for block and chaincode events.
///
/// Subscriptions are independent: the relative order of a block event and
/// the chaincode events it carries is unspecified. A subscription setup
/// failure is fatal to the caller; there is no automatic retry.
#[async_trait]
pub trait LedgerEventSource: Send + Sync {
    /// Subscribe to block-commit notifications, starting after `after_block`
    /// when a checkpoint is available.
    async fn block_events(&self, after_block: Option<u64>) -> SourceResult<BlockStream>;

    /// Subscribe to chaincode events matching `filter`.
    async fn chaincode_events(&self, filter: EventFilter) -> SourceResult<ChaincodeStream>;
}
