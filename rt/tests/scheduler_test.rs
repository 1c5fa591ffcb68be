//! Integration tests for the request scheduler
//!
//! These drive a real scheduler task through its public handle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqthrottle::{Priority, RequestError, Scheduler, SchedulerConfig, SchedulerHandle};
use tokio::sync::Semaphore;

fn spawn(max_concurrent: usize, dispatch_delay_ms: u64) -> SchedulerHandle {
    Scheduler::spawn(SchedulerConfig {
        max_concurrent,
        dispatch_delay_ms,
        ..Default::default()
    })
}

/// Wait until the scheduler reports `active` running operations
async fn wait_for_active(scheduler: &SchedulerHandle, active: usize) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if scheduler.queue_state().await.unwrap().active == active {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "scheduler never reached {} active", active);
}

// =============================================================================
// Concurrency ceiling
// =============================================================================

#[tokio::test]
async fn test_never_more_than_three_active() {
    let scheduler = Scheduler::spawn(SchedulerConfig {
        dispatch_delay_ms: 10,
        ..Default::default()
    });
    let gate = Arc::new(Semaphore::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let outcomes: Vec<_> = (0..8)
        .map(|i| {
            let gate = gate.clone();
            let running = running.clone();
            let peak = peak.clone();
            scheduler.request(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let permit = gate.acquire().await.map_err(|e| e.to_string())?;
                permit.forget();
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(i)
            })
        })
        .collect();

    wait_for_active(&scheduler, 3).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let state = scheduler.queue_state().await.unwrap();
    assert_eq!(state.active, 3);
    assert_eq!(state.pending, 5);
    assert_eq!(running.load(Ordering::SeqCst), 3);

    gate.add_permits(8);
    let results = futures::future::join_all(outcomes).await;
    let values: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>());

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = scheduler.stats().await.unwrap();
    assert_eq!(stats.peak_concurrent, 3);
    assert_eq!(stats.total_succeeded, 8);
}

// =============================================================================
// Priority ordering
// =============================================================================

#[tokio::test]
async fn test_high_priority_overtakes_background() {
    let scheduler = spawn(1, 0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let blocker = {
        let log = log.clone();
        scheduler.submit(
            move || async move {
                log.lock().unwrap().push("blocker");
                let _ = release_rx.await;
                Ok::<_, String>(())
            },
            Priority::Medium,
        )
    };
    wait_for_active(&scheduler, 1).await;

    let background = {
        let log = log.clone();
        scheduler.submit(
            move || async move {
                log.lock().unwrap().push("background");
                Ok::<_, String>(())
            },
            Priority::Background,
        )
    };
    let high = {
        let log = log.clone();
        scheduler.submit(
            move || async move {
                log.lock().unwrap().push("high");
                Ok::<_, String>(())
            },
            Priority::High,
        )
    };

    release_tx.send(()).unwrap();
    blocker.await.unwrap();
    high.await.unwrap();
    background.await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["blocker", "high", "background"]);
}

#[tokio::test]
async fn test_high_without_delay_finishes_before_delayed_background() {
    let scheduler = Scheduler::spawn(SchedulerConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let background = {
        let log = log.clone();
        scheduler.submit(
            move || async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push(Priority::Background);
                Ok::<_, String>(())
            },
            Priority::Background,
        )
    };
    let high = {
        let log = log.clone();
        scheduler.submit(
            move || async move {
                log.lock().unwrap().push(Priority::High);
                Ok::<_, String>(())
            },
            Priority::High,
        )
    };

    high.await.unwrap();
    background.await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![Priority::High, Priority::Background]);
}

#[tokio::test]
async fn test_equal_priority_is_fifo() {
    let scheduler = spawn(1, 0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let outcomes: Vec<_> = (0..6)
        .map(|i| {
            let log = log.clone();
            scheduler.submit(
                move || async move {
                    log.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok::<_, String>(())
                },
                Priority::Low,
            )
        })
        .collect();

    for outcome in outcomes {
        outcome.await.unwrap();
    }
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

// =============================================================================
// Pass-through
// =============================================================================

#[tokio::test]
async fn test_result_passes_through() {
    let scheduler = Scheduler::spawn(SchedulerConfig::default());
    let value = scheduler.submit(|| async { Ok::<_, String>(42) }, Priority::High).await;
    assert_eq!(value.unwrap(), 42);
}

#[tokio::test]
async fn test_error_passes_through() {
    let scheduler = Scheduler::spawn(SchedulerConfig::default());
    let result = scheduler
        .submit(|| async { Err::<(), _>(std::io::Error::other("boom")) }, Priority::Low)
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    let inner = err.into_operation().expect("operation error");
    assert_eq!(inner.kind(), std::io::ErrorKind::Other);
}

#[tokio::test]
async fn test_request_uses_medium_priority() {
    let scheduler = spawn(1, 0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let blocker = scheduler.submit(
        move || async move {
            let _ = release_rx.await;
            Ok::<_, String>(())
        },
        Priority::High,
    );
    wait_for_active(&scheduler, 1).await;

    let record = |label: &'static str| {
        let log = log.clone();
        move || async move {
            log.lock().unwrap().push(label);
            Ok::<_, String>(label)
        }
    };

    // Submitted in an order that only sorts correctly if request() is MEDIUM
    let low = scheduler.submit(record("low"), Priority::Low);
    let plain = scheduler.request(record("request"));
    let high = scheduler.submit(record("high"), Priority::High);
    let medium = scheduler.submit(record("medium"), Priority::Medium);

    release_tx.send(()).unwrap();
    blocker.await.unwrap();
    assert_eq!(plain.await.unwrap(), "request");
    for outcome in [low, high, medium] {
        outcome.await.unwrap();
    }

    assert_eq!(*log.lock().unwrap(), vec!["high", "request", "medium", "low"]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_clear_queue_cancels_never_resolving_requests() {
    let scheduler = Scheduler::spawn(SchedulerConfig::default());

    let first = scheduler.request(|| std::future::pending::<Result<(), String>>());
    let second = scheduler.request(|| std::future::pending::<Result<(), String>>());
    scheduler.clear_queue();

    for outcome in [first, second] {
        let err = outcome.await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("cancelled"));
    }

    let state = scheduler.queue_state().await.unwrap();
    assert_eq!(state.pending, 0);
    assert_eq!(state.in_flight, 0);
}

#[tokio::test]
async fn test_cleared_pending_requests_never_run() {
    let scheduler = spawn(1, 0);
    let ran = Arc::new(AtomicBool::new(false));
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let blocker = scheduler.submit(
        move || async move {
            let _ = release_rx.await;
            Ok::<_, String>("finished anyway")
        },
        Priority::High,
    );
    wait_for_active(&scheduler, 1).await;

    let queued: Vec<_> = (0..3)
        .map(|_| {
            let ran = ran.clone();
            scheduler.submit(
                move || async move {
                    ran.store(true, Ordering::SeqCst);
                    Ok::<_, String>("ran")
                },
                Priority::High,
            )
        })
        .collect();

    scheduler.clear_queue();
    for outcome in queued {
        assert!(matches!(outcome.await, Err(RequestError::Cancelled)));
    }

    // The in-flight blocker is settled as cancelled but keeps its slot
    assert!(blocker.await.unwrap_err().is_cancelled());
    let state = scheduler.queue_state().await.unwrap();
    assert_eq!(state.active, 1);
    assert_eq!(state.pending, 0);

    release_tx.send(()).unwrap();
    wait_for_active(&scheduler, 0).await;
    assert!(!ran.load(Ordering::SeqCst));

    // The scheduler keeps working after a clear
    let after = scheduler.request(|| async { Ok::<_, String>(7) }).await;
    assert_eq!(after.unwrap(), 7);
}

#[tokio::test]
async fn test_cancel_single_request() {
    let scheduler = spawn(1, 0);
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let blocker = scheduler.submit(
        move || async move {
            let _ = release_rx.await;
            Ok::<_, String>(1)
        },
        Priority::High,
    );
    wait_for_active(&scheduler, 1).await;

    let doomed = scheduler.request(|| async { Ok::<_, String>(2) });
    let kept = scheduler.request(|| async { Ok::<_, String>(3) });

    assert!(scheduler.cancel(doomed.id()).await.unwrap());
    assert!(!scheduler.cancel(doomed.id()).await.unwrap());

    release_tx.send(()).unwrap();
    assert_eq!(blocker.await.unwrap(), 1);
    assert!(doomed.await.unwrap_err().is_cancelled());
    assert_eq!(kept.await.unwrap(), 3);
}

// =============================================================================
// Dispatch delay and timeout
// =============================================================================

#[tokio::test]
async fn test_freed_slot_waits_for_dispatch_delay() {
    let scheduler = spawn(1, 100);
    let origin = Instant::now();

    let first = scheduler.request(|| async { Ok::<_, String>(Instant::now()) });
    let second = scheduler.request(|| async { Ok::<_, String>(Instant::now()) });

    let first_started = first.await.unwrap();
    let second_started = second.await.unwrap();

    assert!(first_started.duration_since(origin) < Duration::from_millis(80));
    assert!(second_started.duration_since(first_started) >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_operation_timeout_releases_slot() {
    let scheduler = Scheduler::spawn(SchedulerConfig {
        max_concurrent: 1,
        dispatch_delay_ms: 0,
        operation_timeout_ms: Some(30),
    });

    let stuck = scheduler.request(|| std::future::pending::<Result<(), String>>());
    let next = scheduler.request(|| async { Ok::<_, String>("next") });

    assert!(stuck.await.unwrap_err().is_timeout());
    assert_eq!(next.await.unwrap(), "next");

    let stats = scheduler.stats().await.unwrap();
    assert_eq!(stats.total_timed_out, 1);
    assert_eq!(stats.total_succeeded, 1);
}

#[tokio::test]
async fn test_idle_scheduler_state() {
    let scheduler = Scheduler::spawn(SchedulerConfig::default());
    let state = scheduler.queue_state().await.unwrap();
    assert_eq!(state.active, 0);
    assert_eq!(state.pending, 0);
    assert_eq!(state.stats.total_submitted, 0);

    // Clearing an empty queue is harmless
    scheduler.clear_queue();
    let state = scheduler.queue_state().await.unwrap();
    assert_eq!(state.active, 0);
}
