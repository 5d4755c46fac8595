//! Integration tests for drain and abort shutdown semantics.

mod common;

use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use common::{fast_config, init_tracing, StubEvaluator};
use urteil_scheduler::{Scheduler, SchedulerConfig, SchedulerError};

const TIMEOUT: Duration = Duration::from_secs(10);

fn payload() -> Bytes {
    Bytes::from_static(b"{}")
}

#[tokio::test]
async fn drain_finishes_all_admitted_work() {
    init_tracing();
    let cfg = SchedulerConfig {
        max_concurrency: 2,
        batch_size_ceiling: 1,
        ..fast_config()
    };
    let stub = StubEvaluator::new(Duration::from_millis(50));
    let scheduler = Scheduler::new(stub.clone(), cfg).unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let sub = scheduler
            .submit(payload(), format!("drain-{i}"), &[], None)
            .await
            .unwrap();
        handles.push(sub.handle);
    }

    timeout(TIMEOUT, scheduler.shutdown(true)).await.unwrap();

    for handle in handles {
        let result = handle.wait().await.unwrap();
        assert!(!result.cached);
    }
    assert_eq!(stub.call_count(), 4);

    let stats = scheduler.stats().await;
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn drain_waits_for_dependents_of_in_flight_work() {
    init_tracing();
    let cfg = SchedulerConfig {
        batch_size_ceiling: 1,
        ..fast_config()
    };
    let stub = StubEvaluator::new(Duration::from_millis(60));
    let scheduler = Scheduler::new(stub.clone(), cfg).unwrap();

    let a = scheduler.submit(payload(), "a", &[], None).await.unwrap();
    let b = scheduler
        .submit(payload(), "b", &[a.id], None)
        .await
        .unwrap();

    timeout(TIMEOUT, scheduler.shutdown(true)).await.unwrap();

    a.handle.wait().await.unwrap();
    b.handle.wait().await.unwrap();
    assert_eq!(stub.call_count(), 2, "the dependent still ran under drain");
}

#[tokio::test]
async fn abort_fails_undispatched_work_but_resolves_in_flight() {
    init_tracing();
    let cfg = SchedulerConfig {
        max_concurrency: 1,
        batch_size_ceiling: 1,
        ..fast_config()
    };
    let stub = StubEvaluator::new(Duration::from_millis(150));
    let scheduler = Scheduler::new(stub.clone(), cfg).unwrap();

    // A dispatches immediately; B and C are gated behind it.
    let a = scheduler.submit(payload(), "a", &[], None).await.unwrap();
    let b = scheduler
        .submit(payload(), "b", &[a.id], None)
        .await
        .unwrap();
    let c = scheduler
        .submit(payload(), "c", &[b.id], None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    timeout(TIMEOUT, scheduler.shutdown(false)).await.unwrap();

    // The in-flight call completed; gated work failed with Shutdown.
    let a_result = a.handle.wait().await.unwrap();
    assert_eq!(a_result.body, Bytes::from("scored:a"));
    for sub in [b, c] {
        assert!(matches!(
            sub.handle.wait().await,
            Err(SchedulerError::Shutdown)
        ));
    }
    assert_eq!(stub.call_count(), 1);
}

#[tokio::test]
async fn abort_fails_requests_lingering_in_the_batcher() {
    init_tracing();
    // A huge linger keeps batchable work buffered inside the dispatcher.
    let cfg = SchedulerConfig {
        batch_size_ceiling: 16,
        batch_max_wait_ms: 5_000,
        ..fast_config()
    };
    let stub = StubEvaluator::new(Duration::from_millis(10));
    let scheduler = Scheduler::new(stub.clone(), cfg).unwrap();

    let mut handles = Vec::new();
    for i in 0..3 {
        let sub = scheduler
            .submit(payload(), format!("buffered-{i}"), &[], None)
            .await
            .unwrap();
        handles.push(sub.handle);
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    timeout(TIMEOUT, scheduler.shutdown(false)).await.unwrap();

    for handle in handles {
        assert!(matches!(handle.wait().await, Err(SchedulerError::Shutdown)));
    }
    assert_eq!(stub.call_count(), 0, "nothing was dispatched");
}

#[tokio::test]
async fn submissions_after_shutdown_are_rejected() {
    init_tracing();
    let stub = StubEvaluator::new(Duration::from_millis(5));
    let scheduler = Scheduler::new(stub, fast_config()).unwrap();

    timeout(TIMEOUT, scheduler.shutdown(true)).await.unwrap();

    let err = scheduler
        .submit(payload(), "late", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Shutdown));
}
