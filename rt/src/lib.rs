//! reqthrottle - client-side request throttling
//!
//! Outbound calls are submitted to a [`Scheduler`] as zero-argument async
//! closures tagged with a [`Priority`]. The scheduler runs at most a fixed
//! number of them at once, always starts the highest-priority waiting call
//! first, waits a fixed delay before reusing a freed slot, and can cancel
//! everything that has not settled yet.
//!
//! # Example
//!
//! ```no_run
//! use reqthrottle::{Priority, Scheduler, SchedulerConfig};
//!
//! # async fn demo() {
//! let scheduler = Scheduler::spawn(SchedulerConfig::default());
//!
//! let answer = scheduler
//!     .submit(|| async { Ok::<_, std::io::Error>(42) }, Priority::High)
//!     .await;
//! assert_eq!(answer.unwrap(), 42);
//!
//! scheduler.clear_queue();
//! # }
//! ```
//!
//! # Modules
//!
//! - [`scheduler`] - Priority queue, concurrency ceiling, cancellation
//! - [`domain`] - Priority levels
//! - [`fetch`] - HTTP operations for the scheduler
//! - [`simulate`] - Synthetic workloads
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod scheduler;
pub mod simulate;

// Re-export commonly used types
pub use config::Config;
pub use domain::Priority;
pub use fetch::{FetchError, FetchResponse, HttpConfig};
pub use scheduler::{
    Outcome, QueueState, RequestError, RequestId, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats,
};
pub use simulate::{JobOutcome, JobSpec, SimulationReport};
