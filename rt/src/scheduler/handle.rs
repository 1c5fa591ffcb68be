//! SchedulerHandle - Client interface for submitting work

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use eyre::{Result, eyre};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::Priority;

use super::error::RequestError;
use super::messages::SchedRequest;
use super::queue::{Job, QueueState, RequestId, SchedulerStats, Settlement};

/// Handle for submitting operations to a running scheduler
///
/// Cloneable and cheap; every clone talks to the same scheduler task.
/// Submitting never blocks. When the last handle is dropped the scheduler
/// task stops and cancels whatever is still pending.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedRequest>,
    next_id: Arc<AtomicU64>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SchedRequest>, next_id: Arc<AtomicU64>) -> Self {
        Self { tx, next_id }
    }

    /// Queue an operation at the given priority
    ///
    /// The operation is not invoked until the scheduler dispatches it. The
    /// returned [`Outcome`] resolves with the operation's value, its error
    /// wrapped in [`RequestError::Operation`], [`RequestError::Panicked`] if
    /// the operation panicked, or [`RequestError::Cancelled`].
    pub fn submit<F, Fut, T, E>(&self, operation: F, priority: Priority) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%id, %priority, "SchedulerHandle::submit: called");

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |cancel_rx: oneshot::Receiver<()>, timeout: Option<Duration>| {
            execute(operation, reply_tx, cancel_rx, timeout).boxed()
        });

        if self.tx.send(SchedRequest::Submit { id, priority, job }).is_err() {
            // The job went down with the failed send, so the outcome reports Cancelled
            warn!(%id, "Scheduler is not running, request cancelled");
        }

        Outcome { id, rx: reply_rx }
    }

    /// Queue an operation at [`Priority::Medium`]
    pub fn request<F, Fut, T, E>(&self, operation: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(operation, Priority::Medium)
    }

    /// Cancel every pending and in-flight request
    ///
    /// Pending operations never run. In-flight operations keep running to
    /// completion, but their callers see [`RequestError::Cancelled`] at once.
    pub fn clear_queue(&self) {
        debug!("SchedulerHandle::clear_queue: called");
        if self.tx.send(SchedRequest::Clear).is_err() {
            debug!("SchedulerHandle::clear_queue: scheduler not running");
        }
    }

    /// Cancel a single request; false if it is unknown or already settled
    pub async fn cancel(&self, id: RequestId) -> Result<bool> {
        debug!(%id, "SchedulerHandle::cancel: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedRequest::Cancel { id, reply_tx })
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler shut down before replying"))
    }

    /// Get current queue state
    pub async fn queue_state(&self) -> Result<QueueState> {
        debug!("SchedulerHandle::queue_state: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedRequest::State { reply_tx })
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler shut down before replying"))
    }

    /// Get the scheduler statistics
    pub async fn stats(&self) -> Result<SchedulerStats> {
        Ok(self.queue_state().await?.stats)
    }

    /// Request shutdown of the scheduler task
    pub fn shutdown(&self) -> Result<()> {
        debug!("SchedulerHandle::shutdown: called");
        self.tx
            .send(SchedRequest::Shutdown)
            .map_err(|_| eyre!("Scheduler channel closed"))
    }

    /// Check whether the scheduler task is still accepting requests
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Pending result of a submitted request
///
/// Settles exactly once. Dropping it does not cancel the request.
#[must_use = "an Outcome does nothing unless awaited"]
pub struct Outcome<T, E> {
    id: RequestId,
    rx: oneshot::Receiver<std::result::Result<T, RequestError<E>>>,
}

impl<T, E> Outcome<T, E> {
    /// The id to pass to [`SchedulerHandle::cancel`]
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T, E> Future for Outcome<T, E> {
    type Output = std::result::Result<T, RequestError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A reply channel closed without a value means the job was dropped unrun
        let result = ready!(Pin::new(&mut self.rx).poll(cx));
        Poll::Ready(result.unwrap_or(Err(RequestError::Cancelled)))
    }
}

impl<T, E> std::fmt::Debug for Outcome<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outcome").field("id", &self.id).finish_non_exhaustive()
    }
}

/// How the race inside [`execute`] ended
enum Step<R> {
    Finished(R),
    Cancelled,
    TimedOut,
}

/// Run one dispatched operation and deliver its result to the caller
///
/// The operation closure is called inside the unwind guard, so a panic while
/// building the future is caught the same as one while polling it.
async fn execute<F, Fut, T, E>(
    operation: F,
    reply_tx: oneshot::Sender<std::result::Result<T, RequestError<E>>>,
    mut cancel_rx: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> Settlement
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let operation = AssertUnwindSafe(async move { operation().await }).catch_unwind();
    tokio::pin!(operation);
    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let step = tokio::select! {
        result = &mut operation => Step::Finished(result),
        Ok(()) = &mut cancel_rx => Step::Cancelled,
        () = &mut deadline => Step::TimedOut,
    };

    match step {
        Step::Finished(result) => {
            // Closed before replying, so a later cancel reports the request as settled
            cancel_rx.close();
            if cancel_rx.try_recv().is_ok() {
                let _ = reply_tx.send(Err(RequestError::Cancelled));
                return Settlement::Cancelled;
            }

            match result {
                Ok(Ok(value)) => {
                    let _ = reply_tx.send(Ok(value));
                    Settlement::Succeeded
                }
                Ok(Err(e)) => {
                    let _ = reply_tx.send(Err(RequestError::Operation(e)));
                    Settlement::Failed
                }
                Err(_) => {
                    warn!("Operation panicked");
                    let _ = reply_tx.send(Err(RequestError::Panicked));
                    Settlement::Failed
                }
            }
        }
        Step::Cancelled => {
            let _ = reply_tx.send(Err(RequestError::Cancelled));
            // Work already started is not aborted; it keeps its slot until done
            tokio::select! {
                _ = &mut operation => {}
                () = &mut deadline => {}
            }
            Settlement::Cancelled
        }
        Step::TimedOut => {
            cancel_rx.close();
            let _ = reply_tx.send(Err(RequestError::TimedOut(timeout.unwrap_or_default())));
            Settlement::TimedOut
        }
    }
}
