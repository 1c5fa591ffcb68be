//! Message types for the scheduler task

use tokio::sync::oneshot;

use crate::domain::Priority;

use super::queue::{Job, QueueState, RequestId, Settlement};

/// Requests sent from handles to the scheduler task
pub(crate) enum SchedRequest {
    /// Admit a new request into the pending queue
    Submit {
        id: RequestId,
        priority: Priority,
        job: Job,
    },

    /// Cancel everything not yet settled
    Clear,

    /// Cancel one request
    Cancel {
        id: RequestId,
        reply_tx: oneshot::Sender<bool>,
    },

    /// Snapshot of queue depth, active count and statistics
    State { reply_tx: oneshot::Sender<QueueState> },

    /// Stop the scheduler task
    Shutdown,
}

impl std::fmt::Debug for SchedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit { id, priority, .. } => f
                .debug_struct("Submit")
                .field("id", id)
                .field("priority", priority)
                .finish_non_exhaustive(),
            Self::Clear => write!(f, "Clear"),
            Self::Cancel { id, .. } => f.debug_struct("Cancel").field("id", id).finish_non_exhaustive(),
            Self::State { .. } => write!(f, "State"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Events raised by dispatched work back to the scheduler task
#[derive(Debug)]
pub(crate) enum SchedEvent {
    /// An operation finished and released its slot
    Finished { id: RequestId, settlement: Settlement },

    /// The inter-dispatch delay for a freed slot has elapsed
    SlotReady,
}
