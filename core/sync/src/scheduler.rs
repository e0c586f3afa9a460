//! Sync scheduling - manual and periodic modes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use nivelver_common::{Error, Result};

use crate::report::SyncReport;

/// When reconciliation runs besides explicit requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Only on request.
    #[default]
    Manual,
    /// A full sync at regular intervals, plus requests.
    Periodic { interval: Duration },
}

impl SyncMode {
    /// `Periodic` for a non-zero interval, `Manual` otherwise.
    pub fn from_interval_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(secs) if secs > 0 => SyncMode::Periodic {
                interval: Duration::from_secs(secs),
            },
            _ => SyncMode::Manual,
        }
    }

    fn period(&self) -> Option<Duration> {
        match self {
            SyncMode::Manual => None,
            SyncMode::Periodic { interval } => Some(*interval),
        }
    }
}

/// Reconciliation request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Cloud to local.
    Pull,
    /// Local to cloud.
    Push,
    /// Pull, then push.
    Full,
}

enum Command {
    Sync(SyncRequest, oneshot::Sender<Result<SyncReport>>),
    Shutdown,
}

/// Client side of the scheduler: submits requests and waits for results.
#[derive(Clone)]
pub struct SyncScheduler {
    mode: SyncMode,
    commands: mpsc::Sender<Command>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs it.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (commands, receiver) = mpsc::channel(32);
        (
            Self { mode, commands },
            SyncSchedulerHandle { mode, receiver },
        )
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Queue a request and wait for its result.
    pub async fn request(&self, request: SyncRequest) -> Result<SyncReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Sync(request, reply))
            .await
            .map_err(|_| Error::Internal("Scheduler not running".to_string()))?;

        response
            .await
            .map_err(|_| Error::Internal("Failed to receive sync result".to_string()))?
    }

    /// Stop the scheduler after the request in flight, if any.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    mode: SyncMode,
    receiver: mpsc::Receiver<Command>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler loop.
    ///
    /// This should be spawned in a tokio task. Requests are executed one
    /// at a time by `sync_fn`; in periodic mode a `Full` request is added
    /// on every tick. The loop ends on shutdown or when every
    /// [`SyncScheduler`] has been dropped.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncReport>> + Send,
    {
        let mut ticker = self.mode.period().map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!("Sync scheduler started ({:?})", self.mode);

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(Command::Sync(request, reply)) => {
                        debug!("Processing sync request: {:?}", request);
                        let _ = reply.send(sync_fn(request).await);
                    }
                    Some(Command::Shutdown) | None => {
                        info!("Sync scheduler shutting down");
                        break;
                    }
                },

                _ = next_tick(&mut ticker) => {
                    debug!("Triggering periodic sync");
                    match sync_fn(SyncRequest::Full).await {
                        Ok(report) => info!("Periodic sync completed: {}", report),
                        Err(e) => error!("Periodic sync failed: {}", e),
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
