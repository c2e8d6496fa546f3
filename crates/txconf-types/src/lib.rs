//! Foundation types for txconf.
//!
//! Every other txconf crate depends on `txconf-types`. The types here are the
//! data model of the confirmation correlator: what a cached block header looks
//! like, what an in-flight correlation record carries, and how a terminal
//! record is projected onto one line of the output file.
//!
//! # Key Types
//!
//! - [`TxId`] -- Transaction identifier (the correlation key) with lexical validation
//! - [`BlockHeader`] -- Fields extracted from a block-commit notification
//! - [`PendingRecord`] -- In-flight correlation of a chaincode event
//! - [`ConfirmStatus`] -- PENDING or one of the terminal statuses
//! - [`OutputRecord`] -- Flattened, field-ordered projection of a flushed record

pub mod error;
pub mod header;
pub mod output;
pub mod record;
pub mod txid;

pub use error::TypeError;
pub use header::BlockHeader;
pub use output::OutputRecord;
pub use record::{ConfirmStatus, PendingRecord};
pub use txid::{TxId, TX_ID_HEX_LEN};
