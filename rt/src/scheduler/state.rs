//! Scheduler bookkeeping
//!
//! Owned by the scheduler task. Nothing here awaits, so every mutation of the
//! queue and the active count happens as one step.

use std::collections::{BinaryHeap, HashMap};

use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::Priority;

use super::config::SchedulerConfig;
use super::queue::{Job, QueueState, QueuedRequest, RequestId, SchedulerStats, Settlement};

/// A request popped from the queue, ready to be spawned
pub(crate) struct Dispatch {
    pub id: RequestId,
    pub priority: Priority,
    pub job: Job,
    pub cancel_rx: oneshot::Receiver<()>,
}

pub(crate) struct SchedulerState {
    config: SchedulerConfig,

    /// Priority queue of waiting requests
    queue: BinaryHeap<QueuedRequest>,

    /// Cancel signals for dispatched requests that have not settled
    in_flight: HashMap<RequestId, oneshot::Sender<()>>,

    /// Operations holding a concurrency slot
    active: usize,

    stats: SchedulerStats,
}

impl SchedulerState {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            queue: BinaryHeap::new(),
            in_flight: HashMap::new(),
            active: 0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, id: RequestId, priority: Priority, job: Job) {
        self.queue.push(QueuedRequest::new(id, priority, job));
        self.stats.total_submitted += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.queue.len());
        debug!(%id, %priority, pending = self.queue.len(), "SchedulerState::enqueue: queued");
    }

    /// Pop as many requests as free slots allow
    ///
    /// Empty queue or no free slot yields nothing and changes nothing.
    pub fn drain(&mut self) -> Vec<Dispatch> {
        let mut dispatched = Vec::new();

        while self.active < self.config.max_concurrent {
            let Some(request) = self.queue.pop() else {
                break;
            };

            let (cancel_tx, cancel_rx) = oneshot::channel();
            self.in_flight.insert(request.id, cancel_tx);
            self.active += 1;
            self.stats.total_dispatched += 1;
            self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.active);

            debug!(
                id = %request.id,
                priority = %request.priority,
                waited = ?request.enqueued_at.elapsed(),
                active = self.active,
                "SchedulerState::drain: dispatching"
            );
            dispatched.push(Dispatch {
                id: request.id,
                priority: request.priority,
                job: request.job,
                cancel_rx,
            });
        }

        dispatched
    }

    /// Record that a dispatched operation has finished and released its slot
    pub fn finish(&mut self, id: RequestId, settlement: Settlement) {
        self.in_flight.remove(&id);
        self.active = self.active.saturating_sub(1);

        match settlement {
            Settlement::Succeeded => self.stats.total_succeeded += 1,
            Settlement::Failed => self.stats.total_failed += 1,
            Settlement::Cancelled => self.stats.total_cancelled += 1,
            Settlement::TimedOut => self.stats.total_timed_out += 1,
        }
        debug!(%id, ?settlement, active = self.active, "SchedulerState::finish: slot released");
    }

    /// Cancel everything that has not settled and empty the queue
    ///
    /// Returns the number of requests cancelled. In-flight operations keep
    /// running; only their outcomes are settled here.
    pub fn clear(&mut self) -> usize {
        let pending = self.queue.len();
        // Dropping the jobs closes their reply channels
        self.queue.clear();
        self.stats.total_cancelled += pending as u64;

        let in_flight = self.in_flight.len();
        for (id, cancel_tx) in self.in_flight.drain() {
            debug!(%id, "SchedulerState::clear: signalling in-flight request");
            let _ = cancel_tx.send(());
        }

        debug!(pending, in_flight, "SchedulerState::clear: done");
        pending + in_flight
    }

    /// Cancel a single request; false if it is unknown or already settled
    pub fn cancel(&mut self, id: RequestId) -> bool {
        if let Some(cancel_tx) = self.in_flight.remove(&id) {
            debug!(%id, "SchedulerState::cancel: signalling in-flight request");
            return cancel_tx.send(()).is_ok();
        }

        let original_len = self.queue.len();
        self.queue.retain(|r| r.id != id);
        let removed = original_len != self.queue.len();
        if removed {
            self.stats.total_cancelled += 1;
            debug!(%id, "SchedulerState::cancel: removed from queue");
        } else {
            debug!(%id, "SchedulerState::cancel: not found");
        }
        removed
    }

    pub fn snapshot(&self) -> QueueState {
        QueueState {
            active: self.active,
            pending: self.queue.len(),
            in_flight: self.in_flight.len(),
            stats: self.stats.clone(),
        }
    }
}
