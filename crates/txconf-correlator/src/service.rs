use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use txconf_sink::{RecordSink, SinkError};
use txconf_source::{Checkpointer, EventFilter, InMemoryCheckpointer, LedgerEventSource};
use txconf_types::OutputRecord;

use crate::config::CorrelatorConfig;
use crate::correlator::Correlator;
use crate::encoder::{HeaderEncoder, JsonHeaderEncoder};
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::evictor::CacheEvictor;
use crate::listener::{BlockListener, EventListener};
use crate::reporter::StatusReporter;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::state::CorrelationState;
use crate::stats::{CorrelatorStats, StatsSnapshot};
use crate::worker::Worker;

type WorkerSet = JoinSet<(&'static str, CorrelatorResult<()>)>;

/// Summary of a completed shutdown.
#[derive(Clone, Debug, Serialize)]
pub struct ShutdownReport {
    /// Records written during the drain, whatever their status.
    pub flushed_on_shutdown: usize,
    /// Where the output was renamed to, when rotation is enabled.
    pub rotated_to: Option<PathBuf>,
    pub stats: StatsSnapshot,
}

/// Owns the correlation state and runs the workers over it.
///
/// A service runs once. [`CorrelatorService::run`] subscribes to both
/// streams, starts the workers, and returns after the shutdown sequence
/// completes, either because `cancel` fired or because a worker failed.
pub struct CorrelatorService {
    config: CorrelatorConfig,
    source: Arc<dyn LedgerEventSource>,
    sink: Arc<dyn RecordSink>,
    checkpointer: Arc<dyn Checkpointer>,
    encoder: Arc<dyn HeaderEncoder>,
    state: Arc<CorrelationState>,
    shutdown: ShutdownCoordinator,
    started: AtomicBool,
}

impl CorrelatorService {
    pub fn new(
        config: CorrelatorConfig,
        source: Arc<dyn LedgerEventSource>,
        sink: Arc<dyn RecordSink>,
    ) -> CorrelatorResult<Self> {
        config.validate()?;
        let state = Arc::new(CorrelationState::new(config.cache_capacity));
        Ok(Self {
            config,
            source,
            sink,
            checkpointer: Arc::new(InMemoryCheckpointer::new()),
            encoder: Arc::new(JsonHeaderEncoder),
            state,
            shutdown: ShutdownCoordinator::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn HeaderEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Shared correlation state.
    pub fn state(&self) -> &Arc<CorrelationState> {
        &self.state
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<ShutdownState> {
        self.shutdown.subscribe()
    }

    /// Run until `cancel` fires or a worker fails, then drain.
    ///
    /// Once the workers have stopped, one last correlation pass confirms
    /// whatever the cache can still resolve; everything else is written
    /// pending. Subscription failures return before any worker starts. A
    /// worker failure still goes through the full shutdown sequence and is
    /// returned once the drain has completed.
    pub async fn run(&self, cancel: CancellationToken) -> CorrelatorResult<ShutdownReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CorrelatorError::AlreadyStarted);
        }

        let checkpoint = self.checkpointer.current();
        let resume_block = checkpoint.block_resume_point();
        let blocks = self.source.block_events(resume_block).await?;
        let filter = EventFilter::chaincode(&self.config.chaincode_name)
            .resume_after(checkpoint.chaincode.clone());
        let events = self.source.chaincode_events(filter).await?;
        info!(
            chaincode = %self.config.chaincode_name,
            capacity = self.config.cache_capacity,
            resume_block = ?resume_block,
            "correlator service started"
        );

        let workers = cancel.child_token();
        let mut set = WorkerSet::new();
        let tick = self.config.tick_interval();
        spawn(
            &mut set,
            BlockListener::new(blocks, self.state.clone(), self.checkpointer.clone()),
            &workers,
        );
        spawn(
            &mut set,
            EventListener::new(events, self.state.clone(), self.checkpointer.clone()),
            &workers,
        );
        spawn(&mut set, self.correlator(), &workers);
        spawn(&mut set, CacheEvictor::new(self.state.clone(), tick), &workers);
        if let Some(interval) = self.config.status_interval() {
            spawn(
                &mut set,
                StatusReporter::new(self.state.clone(), interval),
                &workers,
            );
        }

        let mut failure: Option<CorrelatorError> = None;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => info!("stop requested"),
            Some(joined) = set.join_next() => match worker_outcome(joined) {
                Err(e) => failure = Some(e),
                // The worker observed the stop before this task did.
                Ok(_) if cancel.is_cancelled() => info!("stop requested"),
                // Workers only return on their own when they cannot continue.
                Ok(name) => {
                    failure = Some(CorrelatorError::Worker {
                        name,
                        reason: "exited before shutdown".into(),
                    })
                }
            },
        }
        if let Some(ref e) = failure {
            error!(error = %e, "worker failed; shutting down");
        }

        self.shutdown.advance(ShutdownState::Stopping);
        workers.cancel();
        while let Some(joined) = set.join_next().await {
            if let Err(e) = worker_outcome(joined) {
                warn!(error = %e, "worker failed during shutdown");
                failure.get_or_insert(e);
            }
        }

        // Resolve what the cache can still confirm before forcing the rest out.
        if !matches!(failure, Some(CorrelatorError::Sink(_))) {
            match self.correlator().run_pass() {
                Ok(outcome) if outcome.flushed > 0 => {
                    info!(flushed = outcome.flushed, "final correlation pass")
                }
                Ok(_) => {}
                Err(e) => {
                    failure.get_or_insert(e.into());
                }
            }
        }

        self.shutdown.advance(ShutdownState::Draining);
        let flushed = match self.drain() {
            Ok(flushed) => flushed,
            Err(e) => {
                failure.get_or_insert(e.into());
                0
            }
        };
        if let Err(e) = self.checkpointer.save() {
            error!(error = %e, "failed to save checkpoint");
            failure.get_or_insert(e.into());
        }

        let rotate_at = self.config.rotate_on_shutdown.then(Utc::now);
        let rotated_to = match self.sink.finish(rotate_at) {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "failed to close output");
                failure.get_or_insert(e.into());
                None
            }
        };
        self.shutdown.advance(ShutdownState::Stopped);

        let report = ShutdownReport {
            flushed_on_shutdown: flushed,
            rotated_to,
            stats: self.state.snapshot(),
        };
        info!(
            flushed = report.flushed_on_shutdown,
            confirmed = report.stats.confirmed,
            rotated_to = ?report.rotated_to,
            "correlator service stopped"
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn correlator(&self) -> Correlator {
        Correlator::new(
            self.state.clone(),
            self.sink.clone(),
            self.encoder.clone(),
            self.config.tick_interval(),
        )
    }

    /// Flush every remaining pending-table entry once, whatever its status.
    ///
    /// Every record is attempted; records that could not be written are
    /// logged and the first error is returned.
    fn drain(&self) -> Result<usize, SinkError> {
        let records = self.state.pending.drain();
        let mut flushed = 0;
        let mut first_error = None;
        for record in &records {
            let output = OutputRecord::from(record);
            match self.sink.write(&output) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    error!(
                        error = %e,
                        line = %output.to_line(),
                        "failed to write record during drain"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        CorrelatorStats::add(&self.state.stats.flushed_on_shutdown, flushed as u64);
        info!(flushed, total = records.len(), "pending records drained");

        if let Some(e) = first_error {
            return Err(e);
        }
        self.sink.flush()?;
        Ok(flushed)
    }
}

impl std::fmt::Debug for CorrelatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelatorService")
            .field("config", &self.config)
            .field("state", &self.shutdown.state())
            .finish_non_exhaustive()
    }
}

fn spawn<W: Worker>(set: &mut WorkerSet, worker: W, cancel: &CancellationToken) {
    let cancel = cancel.clone();
    set.spawn(async move { (W::NAME, worker.run(cancel).await) });
}

fn worker_outcome(
    joined: Result<(&'static str, CorrelatorResult<()>), JoinError>,
) -> CorrelatorResult<&'static str> {
    match joined {
        Ok((name, Ok(()))) => Ok(name),
        Ok((_, Err(e))) => Err(e),
        Err(e) => Err(CorrelatorError::Worker {
            name: "unknown",
            reason: e.to_string(),
        }),
    }
}
