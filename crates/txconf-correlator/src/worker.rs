//! [`Worker`] trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CorrelatorResult;

/// A long-running task of the correlator service.
///
/// Every worker shares the service lifetime and observes the same stop
/// notification. A worker returns `Ok(())` when it stopped because it was
/// cancelled, and `Err` when it cannot continue, which stops the whole
/// service.
#[async_trait]
pub trait Worker: Send + 'static {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Run until `cancel` fires or a fatal error occurs.
    async fn run(self, cancel: CancellationToken) -> CorrelatorResult<()>;
}
