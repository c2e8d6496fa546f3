//! Ledger event sources for txconf.
//!
//! A ledger exposes two independent subscriptions: block-commit
//! notifications and chaincode (smart-contract) events filtered by contract
//! name. This crate defines that seam ([`LedgerEventSource`]), the event
//! shapes that flow through it, the extraction of correlator inputs from raw
//! events, and checkpoint acknowledgement ([`Checkpointer`]).
//!
//! # Sources
//!
//! - [`ChannelEventSource`] -- in-process fan-out source for tests and embedding
//! - [`NdjsonEventSource`] -- replays newline-delimited JSON event files

pub mod channel;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod ndjson;
pub mod traits;

pub use channel::ChannelEventSource;
pub use checkpoint::{
    ChaincodePosition, Checkpoint, Checkpointer, FileCheckpointer, InMemoryCheckpointer,
};
pub use error::{EventKind, SourceError, SourceResult};
pub use event::{BlockEvent, ChaincodeEvent, EventFilter, RawBlockHeader};
pub use ndjson::NdjsonEventSource;
pub use traits::{BlockStream, ChaincodeStream, LedgerEventSource};
