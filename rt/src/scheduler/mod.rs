//! Scheduler for outbound requests
//!
//! Admits asynchronous operations by priority, bounds how many run at once,
//! waits a fixed delay before refilling a freed slot, and supports bulk and
//! single-request cancellation.

mod config;
mod core;
mod error;
mod handle;
mod messages;
mod queue;
mod state;

pub use config::SchedulerConfig;
pub use core::Scheduler;
pub use error::RequestError;
pub use handle::{Outcome, SchedulerHandle};
pub use queue::{QueueState, RequestId, SchedulerStats};
