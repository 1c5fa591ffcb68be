//! Queue types for the scheduler

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::Priority;

/// Identifies one submitted request for its whole lifetime
///
/// Ids are assigned in submission order and double as the FIFO tie-break
/// between requests of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// How a dispatched operation ended, as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// Type-erased unit of work
///
/// Owns the operation and the caller's reply channel. It is handed the
/// request's cancel signal and the operation timeout when dispatched.
/// Dropping a job without running it closes the reply channel, which the
/// caller observes as a cancellation.
pub(crate) type Job = Box<dyn FnOnce(oneshot::Receiver<()>, Option<Duration>) -> BoxFuture<'static, Settlement> + Send>;

/// A request waiting in the pending queue
pub(crate) struct QueuedRequest {
    pub id: RequestId,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub job: Job,
}

impl QueuedRequest {
    pub fn new(id: RequestId, priority: Priority, job: Job) -> Self {
        Self {
            id,
            priority,
            enqueued_at: Instant::now(),
            job,
        }
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

impl Eq for QueuedRequest {}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then earlier submission
        self.priority.cmp(&other.priority).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    pub total_timed_out: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    /// Operations currently holding a concurrency slot
    pub active: usize,
    /// Requests waiting for a slot
    pub pending: usize,
    /// Dispatched requests whose outcome has not settled yet
    pub in_flight: usize,
    pub stats: SchedulerStats,
}
