//! Integration tests for pacer
//!
//! End-to-end queue behavior through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pacer::{
    AbortSignal, AsyncQueuer, AsyncQueuerOptions, Pacer, PacerError, PacerStatus, QueuePosition, Queuer,
    QueuerConfig, QueuerOptions,
};

fn stopped() -> QueuerConfig {
    QueuerConfig {
        started: false,
        ..Default::default()
    }
}

fn sync_recorder(config: QueuerConfig) -> (Queuer<char>, Arc<Mutex<Vec<char>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let queuer = Queuer::new(move |c| sink.lock().push(c), QueuerOptions::new(config)).expect("valid options");
    (queuer, seen)
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn test_size_after_n_accepted_enqueues() {
    let (queuer, _) = sync_recorder(QueuerConfig {
        max_size: Some(10),
        ..stopped()
    });
    for (n, c) in ('a'..='j').enumerate() {
        assert!(queuer.add_item(c).unwrap());
        assert_eq!(queuer.size(), n + 1);
    }
}

#[test]
fn test_overflow_rejects_newest() {
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rejected);
    let options = QueuerOptions::new(QueuerConfig {
        max_size: Some(3),
        ..stopped()
    })
    .on_reject(move |c: &char| sink.lock().push(*c));
    let queuer = Queuer::new(|_| {}, options).unwrap();

    for c in ['a', 'b', 'c', 'd', 'e'] {
        queuer.add_item(c).unwrap();
    }
    assert_eq!(queuer.peek_all_items(), vec!['a', 'b', 'c']);
    assert_eq!(*rejected.lock(), vec!['d', 'e']);
    assert_eq!(queuer.state().rejection_count, 2);
}

#[tokio::test]
async fn test_async_overflow_fails_pending_result() {
    let queuer = AsyncQueuer::new(
        |c: char, _: AbortSignal| async move { eyre::Ok(c) },
        AsyncQueuerOptions::new(QueuerConfig {
            max_size: Some(1),
            ..stopped()
        }),
    )
    .unwrap();

    let first = queuer.enqueue('a', None, true).unwrap();
    assert!(matches!(queuer.add_item('b').await, Err(PacerError::QueueFull { max_size: 1 })));
    queuer.start();
    assert_eq!(first.await.unwrap(), Some('a'));
    assert_eq!(queuer.state().rejection_count, 1);
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_lifo_order() {
    let (queuer, seen) = sync_recorder(QueuerConfig {
        get_items_from: QueuePosition::Back,
        ..stopped()
    });
    for c in ['a', 'b', 'c'] {
        queuer.add_item(c).unwrap();
    }
    queuer.start();
    assert_eq!(*seen.lock(), vec!['c', 'b', 'a']);
}

#[test]
fn test_fifo_order() {
    let (queuer, seen) = sync_recorder(stopped());
    for c in ['a', 'b', 'c'] {
        queuer.add_item(c).unwrap();
    }
    queuer.start();
    assert_eq!(*seen.lock(), vec!['a', 'b', 'c']);
}

#[tokio::test]
async fn test_async_priority_dispatch_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    let options = AsyncQueuerOptions::new(stopped())
        .get_priority(|n: &u32| i64::from(*n) % 3)
        .on_execute(move |n: &u32| sink.lock().push(*n));
    let queuer = AsyncQueuer::new(|n: u32, _| async move { eyre::Ok(n) }, options).unwrap();

    let pending: Vec<_> = [5, 3, 4, 6, 1]
        .into_iter()
        .map(|n| queuer.enqueue(n, None, true).unwrap())
        .collect();
    queuer.start();
    futures::future::join_all(pending).await;

    // Priorities: 5→2, 3→0, 4→1, 6→0, 1→1
    assert_eq!(*order.lock(), vec![3, 6, 4, 1, 5]);
}

#[test]
fn test_take_end_change_keeps_lowest_priority_first() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = QueuerOptions::new(stopped()).get_priority(|n: &u32| i64::from(*n));
    let queuer = Queuer::new(move |n| sink.lock().push(n), options).unwrap();
    for n in [5, 1, 3] {
        queuer.add_item(n).unwrap();
    }

    queuer.set_options(|o| o.config.get_items_from = QueuePosition::Back).unwrap();
    queuer.start();
    assert_eq!(*seen.lock(), vec![1, 3, 5]);
}

// =============================================================================
// Pacing
// =============================================================================

#[test]
fn test_wait_paces_items_added_after_start() {
    let (queuer, seen) = sync_recorder(QueuerConfig {
        wait_ms: 1_000,
        ..Default::default()
    });
    for c in ['a', 'b', 'c'] {
        queuer.add_item(c).unwrap();
    }
    assert_eq!(*seen.lock(), vec!['a']);
    assert_eq!(queuer.peek_all_items(), vec!['b', 'c']);
}

#[tokio::test]
async fn test_async_wait_paces_items_added_after_start() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&starts);
    let queuer = AsyncQueuer::new(
        move |n: u32, _| {
            sink.lock().push(tokio::time::Instant::now());
            async move { eyre::Ok(n) }
        },
        AsyncQueuerOptions::new(QueuerConfig {
            wait_ms: 50,
            ..Default::default()
        }),
    )
    .unwrap();

    let pending: Vec<_> = (0..3).map(|n| queuer.enqueue(n, None, true).unwrap()).collect();
    futures::future::join_all(pending).await;

    let starts = starts.lock().clone();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(45));
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrency_cap_of_two() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
    let queuer = AsyncQueuer::new(
        move |n: u32, _| {
            let active = Arc::clone(&a);
            let peak = Arc::clone(&p);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                eyre::Ok(n)
            }
        },
        AsyncQueuerOptions::new(QueuerConfig {
            concurrency: 2,
            ..Default::default()
        }),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let pending: Vec<_> = (0..5).map(|n| queuer.enqueue(n, None, true).unwrap()).collect();
    let results = futures::future::join_all(pending).await;

    assert_eq!(results.into_iter().filter(|r| r.is_ok()).count(), 5);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(queuer.state().execution_count, 5);
    assert_eq!(queuer.state().settle_count, 5);
    // Three rounds of 50ms
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(queuer.is_idle());
}

#[tokio::test]
async fn test_results_settle_out_of_dispatch_order() {
    let settled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&settled);
    let options = AsyncQueuerOptions::new(QueuerConfig {
        concurrency: 2,
        ..Default::default()
    })
    .on_settled(move |ms: &u64| sink.lock().push(*ms));
    let queuer = AsyncQueuer::new(
        |ms: u64, _| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            eyre::Ok(ms)
        },
        options,
    )
    .unwrap();

    let slow = queuer.enqueue(60, None, true).unwrap();
    let fast = queuer.enqueue(10, None, true).unwrap();
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow.unwrap(), Some(60));
    assert_eq!(fast.unwrap(), Some(10));
    assert_eq!(*settled.lock(), vec![10, 60]);
}

// =============================================================================
// Expiration
// =============================================================================

#[tokio::test]
async fn test_expiration_is_read_triggered() {
    let expired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&expired);
    let options = QueuerOptions::new(QueuerConfig {
        expiration_ms: Some(50),
        ..stopped()
    })
    .on_expire(move |_: &char| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let queuer = Queuer::new(|_| {}, options).unwrap();
    queuer.add_item('x').unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(queuer.state().expiration_count, 0);
    assert_eq!(expired.load(Ordering::SeqCst), 0);

    assert_eq!(queuer.get_next_item(None), None);
    assert_eq!(queuer.state().expiration_count, 1);
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_reset_zeroes_everything() {
    let (queuer, _) = sync_recorder(stopped());
    for c in ['a', 'b', 'c'] {
        queuer.add_item(c).unwrap();
    }
    queuer.execute(None);
    queuer.reset();

    let state = queuer.state();
    assert_eq!(queuer.size(), 0);
    assert_eq!(state.add_item_count, 0);
    assert_eq!(state.execution_count, 0);
}

#[test]
fn test_clear_keeps_counters() {
    let (queuer, _) = sync_recorder(stopped());
    for c in ['a', 'b', 'c'] {
        queuer.add_item(c).unwrap();
    }
    queuer.execute(None);
    queuer.clear();

    let state = queuer.state();
    assert_eq!(queuer.size(), 0);
    assert_eq!(state.add_item_count, 3);
    assert_eq!(state.execution_count, 1);
}

#[tokio::test]
async fn test_disable_then_reenable() {
    let queuer = AsyncQueuer::new(
        |n: u32, _| async move { eyre::Ok(n) },
        AsyncQueuerOptions::default(),
    )
    .unwrap();
    assert!(queuer.is_running());
    assert_eq!(queuer.status(), PacerStatus::Running);

    queuer.set_options(|o| o.config.pacer.enabled = false).unwrap();
    assert!(!queuer.is_running());
    assert_eq!(queuer.status(), PacerStatus::Disabled);
    assert!(matches!(queuer.enqueue(1, None, true), Err(PacerError::Disabled { .. })));

    queuer.set_options(|o| o.config.pacer.enabled = true).unwrap();
    assert_eq!(queuer.status(), PacerStatus::Idle);
    assert!(!queuer.is_running());

    queuer.start();
    assert_eq!(queuer.add_item(2).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_state_subscription_sees_final_snapshot() {
    let queuer = AsyncQueuer::new(
        |n: u32, _| async move { eyre::Ok(n + 1) },
        AsyncQueuerOptions::default(),
    )
    .unwrap();
    let mut rx = queuer.subscribe();

    assert_eq!(queuer.add_item(1).await.unwrap(), Some(2));
    rx.changed().await.unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.success_count, 1);
    assert_eq!(snapshot.last_result, Some(2));
    assert!(snapshot.active_items.is_empty());
}
