//! Shared correlation state for txconf.
//!
//! Two structures are shared between the service workers:
//!
//! - [`HeaderCache`] -- block sequence number to [`BlockHeader`], bounded by
//!   oldest-first eviction
//! - [`PendingTable`] -- transaction id to in-flight [`PendingRecord`]
//!
//! # Locking Rules
//!
//! 1. Each structure is guarded by one coarse lock over the whole structure.
//! 2. No method holds a lock across an `.await`, and no method of one
//!    structure calls into the other, so the two locks are never held together.
//! 3. Every mutation bumps a generation counter on a `watch` channel, which
//!    workers await instead of polling.
//!
//! [`BlockHeader`]: txconf_types::BlockHeader
//! [`PendingRecord`]: txconf_types::PendingRecord

pub mod header_cache;
pub mod pending;

pub use header_cache::HeaderCache;
pub use pending::{PendingEntry, PendingTable};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquire a lock, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
