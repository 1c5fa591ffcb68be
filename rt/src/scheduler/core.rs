//! Scheduler task implementation

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::handle::SchedulerHandle;
use super::messages::{SchedEvent, SchedRequest};
use super::queue::Settlement;
use super::state::{Dispatch, SchedulerState};

/// The Scheduler admits operations by priority, runs at most
/// `max_concurrent` of them at once, and spaces out refills of freed slots.
///
/// All bookkeeping lives in one task; [`SchedulerHandle`]s talk to it over a
/// channel. Build one with [`Scheduler::new`], take handles, then drive it
/// with [`Scheduler::run`], or use [`Scheduler::spawn`] for both.
pub struct Scheduler {
    config: SchedulerConfig,
    tx: mpsc::UnboundedSender<SchedRequest>,
    rx: mpsc::UnboundedReceiver<SchedRequest>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create a new scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            tx,
            rx,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a scheduler on the current tokio runtime and return a handle to it
    pub fn spawn(config: SchedulerConfig) -> SchedulerHandle {
        let scheduler = Self::new(config);
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());
        handle
    }

    /// Get a handle for submitting work
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.tx.clone(), self.next_id.clone())
    }

    /// Run the scheduler task
    ///
    /// Runs until shutdown is requested or every handle is dropped. Whatever
    /// is still pending at that point is cancelled.
    pub async fn run(self) {
        let Scheduler { config, tx, mut rx, .. } = self;
        // Only handles keep the request channel open
        drop(tx);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut state = SchedulerState::new(config);

        info!(
            max_concurrent = state.config().max_concurrent,
            dispatch_delay_ms = state.config().dispatch_delay_ms,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                // Completions are applied before any request queued behind them
                biased;

                Some(event) = events_rx.recv() => {
                    match event {
                        SchedEvent::Finished { id, settlement } => {
                            state.finish(id, settlement);
                            schedule_refill(&state, &events_tx);
                        }

                        SchedEvent::SlotReady => {
                            launch(state.drain(), &state, &events_tx);
                        }
                    }
                }

                req = rx.recv() => {
                    let Some(req) = req else {
                        debug!("Scheduler::run: all handles dropped");
                        break;
                    };

                    match req {
                        SchedRequest::Submit { id, priority, job } => {
                            state.enqueue(id, priority, job);
                            launch(state.drain(), &state, &events_tx);
                        }

                        SchedRequest::Clear => {
                            let cancelled = state.clear();
                            info!(cancelled, "Queue cleared");
                        }

                        SchedRequest::Cancel { id, reply_tx } => {
                            let _ = reply_tx.send(state.cancel(id));
                        }

                        SchedRequest::State { reply_tx } => {
                            let _ = reply_tx.send(state.snapshot());
                        }

                        SchedRequest::Shutdown => {
                            debug!("Scheduler::run: shutdown requested");
                            break;
                        }
                    }
                }
            }
        }

        let cancelled = state.clear();
        info!(cancelled, active = state.active(), "Scheduler stopped");
    }
}

/// Spawn dispatched requests; each reports back when its operation is done
fn launch(dispatched: Vec<Dispatch>, state: &SchedulerState, events_tx: &mpsc::UnboundedSender<SchedEvent>) {
    let timeout = state.config().operation_timeout();

    for Dispatch {
        id,
        priority,
        job,
        cancel_rx,
    } in dispatched
    {
        debug!(%id, %priority, "launch: spawning operation");
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            // Building the job future runs inside the guard too; Finished must always be sent
            let guarded = AssertUnwindSafe(async move { job(cancel_rx, timeout).await });
            let settlement = match guarded.catch_unwind().await {
                Ok(settlement) => settlement,
                Err(_) => {
                    warn!(%id, "Job panicked");
                    Settlement::Failed
                }
            };
            let _ = events_tx.send(SchedEvent::Finished { id, settlement });
        });
    }
}

/// Try to fill a freed slot once the inter-dispatch delay has passed
fn schedule_refill(state: &SchedulerState, events_tx: &mpsc::UnboundedSender<SchedEvent>) {
    if state.pending() == 0 {
        return;
    }

    let delay = state.config().dispatch_delay();
    if delay.is_zero() {
        let _ = events_tx.send(SchedEvent::SlotReady);
        return;
    }

    let events_tx = events_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = events_tx.send(SchedEvent::SlotReady);
    });
}
