//! Transaction confirmation correlator.
//!
//! Joins a ledger's block-commit stream and its chaincode-event stream by
//! transaction id, writing one line per submitted transaction once the
//! block it landed in has been seen.
//!
//! # Workers
//!
//! A [`CorrelatorService`] owns one [`CorrelationState`] and runs a fixed
//! set of [`Worker`]s over it:
//!
//! - [`BlockListener`] -- block events into the header cache
//! - [`EventListener`] -- chaincode events into the pending table
//! - [`Correlator`] -- resolves pending records and writes terminal ones
//! - [`CacheEvictor`] -- keeps the header cache within its bound
//! - [`StatusReporter`] -- periodic counter logging (optional)
//!
//! Each worker holds at most one table lock at a time. The correlator and
//! evictor wake on table changes or a bounded tick, never by spinning.
//!
//! # Shutdown
//!
//! Cancelling the token passed to [`CorrelatorService::run`] moves the
//! service through [`ShutdownState`]: workers are stopped and joined, every
//! remaining pending record is written once, the checkpoint is saved, and
//! the output is closed and optionally rotated.

pub mod config;
pub mod correlator;
pub mod encoder;
pub mod error;
pub mod evictor;
pub mod listener;
pub mod reporter;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod stats;
pub mod worker;

pub use config::CorrelatorConfig;
pub use correlator::{Correlator, PassOutcome};
pub use encoder::{HeaderEncoder, JsonHeaderEncoder};
pub use error::{ConfigError, CorrelatorError, CorrelatorResult};
pub use evictor::CacheEvictor;
pub use listener::{BlockListener, EventListener};
pub use reporter::StatusReporter;
pub use service::{CorrelatorService, ShutdownReport};
pub use shutdown::{shutdown_signal, ShutdownCoordinator, ShutdownState};
pub use state::CorrelationState;
pub use stats::{CorrelatorStats, StatsSnapshot};
pub use worker::Worker;
