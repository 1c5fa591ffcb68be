//! Synthetic workloads
//!
//! Runs sleep-only jobs through a scheduler and records when each one
//! started, so dispatch order and concurrency can be inspected without a
//! network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use eyre::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::Priority;
use crate::scheduler::{RequestError, SchedulerHandle, SchedulerStats};

/// One synthetic job: `PRIORITY:MILLIS` or `PRIORITY:MILLIS:fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSpec {
    pub priority: Priority,
    pub duration_ms: u64,
    pub fail: bool,
}

impl std::str::FromStr for JobSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (priority, duration, fail) = match parts.as_slice() {
            [priority, duration] => (priority, duration, false),
            [priority, duration, "fail"] => (priority, duration, true),
            _ => return Err(format!("Invalid job '{}'. Use PRIORITY:MILLIS[:fail]", s)),
        };

        Ok(Self {
            priority: priority.parse()?,
            duration_ms: duration
                .parse()
                .map_err(|_| format!("Invalid duration '{}' in job '{}'", duration, s))?,
            fail,
        })
    }
}

impl std::fmt::Display for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.priority, self.duration_ms)?;
        if self.fail {
            write!(f, ":fail")?;
        }
        Ok(())
    }
}

/// Workload used when none is given on the command line
pub fn default_jobs() -> Vec<JobSpec> {
    [
        (Priority::Background, 300),
        (Priority::Low, 200),
        (Priority::Medium, 200),
        (Priority::High, 100),
        (Priority::Background, 100),
        (Priority::High, 150),
        (Priority::Medium, 100),
    ]
    .into_iter()
    .map(|(priority, duration_ms)| JobSpec {
        priority,
        duration_ms,
        fail: false,
    })
    .collect()
}

/// How a synthetic job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// What happened to one job
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedJob {
    /// Position on the command line
    pub index: usize,
    pub priority: Priority,
    pub duration_ms: u64,
    /// Order in which the operation actually started; None if it never ran
    pub start_order: Option<usize>,
    pub started_at_ms: Option<u64>,
    pub settled_at_ms: u64,
    pub outcome: JobOutcome,
}

/// Result of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub jobs: Vec<SimulatedJob>,
    /// Most operations observed running at the same moment
    pub peak_concurrent: usize,
    pub elapsed_ms: u64,
    pub stats: SchedulerStats,
}

impl SimulationReport {
    /// Jobs that started, in start order
    pub fn start_sequence(&self) -> Vec<&SimulatedJob> {
        let mut started: Vec<_> = self.jobs.iter().filter(|j| j.start_order.is_some()).collect();
        started.sort_by_key(|j| j.start_order);
        started
    }
}

#[derive(Default)]
struct Probe {
    running: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

/// Submit every job, optionally clear the queue after a delay, and wait for
/// all outcomes
pub async fn run_simulation(
    scheduler: &SchedulerHandle,
    jobs: &[JobSpec],
    clear_after: Option<Duration>,
) -> Result<SimulationReport> {
    debug!(jobs = jobs.len(), ?clear_after, "run_simulation: called");
    let origin = Instant::now();
    let probe = Arc::new(Probe::default());

    let mut pending = Vec::with_capacity(jobs.len());
    for (index, spec) in jobs.iter().copied().enumerate() {
        let start: Arc<OnceLock<(usize, u64)>> = Arc::new(OnceLock::new());
        let probe = probe.clone();
        let start_slot = start.clone();

        let outcome = scheduler.submit(
            move || async move {
                let order = probe.started.fetch_add(1, Ordering::SeqCst);
                let _ = start_slot.set((order, origin.elapsed().as_millis() as u64));
                let running = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
                probe.peak.fetch_max(running, Ordering::SeqCst);

                tokio::time::sleep(Duration::from_millis(spec.duration_ms)).await;

                probe.running.fetch_sub(1, Ordering::SeqCst);
                if spec.fail {
                    Err(format!("job {} failed", index))
                } else {
                    Ok(index)
                }
            },
            spec.priority,
        );

        pending.push(async move {
            let result = outcome.await;
            let settled_at_ms = origin.elapsed().as_millis() as u64;
            let started = start.get().copied();
            SimulatedJob {
                index,
                priority: spec.priority,
                duration_ms: spec.duration_ms,
                start_order: started.map(|(order, _)| order),
                started_at_ms: started.map(|(_, at)| at),
                settled_at_ms,
                outcome: match result {
                    Ok(_) => JobOutcome::Succeeded,
                    Err(RequestError::Operation(_) | RequestError::Panicked) => JobOutcome::Failed,
                    Err(RequestError::Cancelled) => JobOutcome::Cancelled,
                    Err(RequestError::TimedOut(_)) => JobOutcome::TimedOut,
                },
            }
        });
    }

    if let Some(delay) = clear_after {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(?delay, "Clearing queue");
            scheduler.clear_queue();
        });
    }

    let jobs = futures::future::join_all(pending).await;
    let stats = scheduler.stats().await?;

    Ok(SimulationReport {
        jobs,
        peak_concurrent: probe.peak.load(Ordering::SeqCst),
        elapsed_ms: origin.elapsed().as_millis() as u64,
        stats,
    })
}
