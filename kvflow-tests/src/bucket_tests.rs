//! Handles driving the in-process bucket controller.
//!
//! These close the loop: proposals wait on real token balances, followers
//! return tokens as they apply entries, and every bucket must be full again
//! once everything is returned.

#![allow(clippy::significant_drop_tightening)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kvflow_core::{LogPosition, RangeId, Tokens, WorkClass, WorkPriority};
use kvflow_handle::{
    BucketController, Clock, FlowControlConfig, FlowControlMode, FlowError, FlowHandle, Handle,
    HandleMetrics, MonotonicClock,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::init_tracing;
use crate::scenarios::{replicas, stream};

struct BucketFixture {
    handle: Arc<Handle<BucketController>>,
    controller: Arc<BucketController>,
    metrics: Arc<HandleMetrics>,
}

impl BucketFixture {
    fn new(config: FlowControlConfig) -> Self {
        let controller = Arc::new(BucketController::new(config).unwrap());
        let metrics = Arc::new(HandleMetrics::new());
        let handle = Arc::new(Handle::new(
            RangeId::new(1),
            Arc::clone(&controller),
            Arc::clone(&metrics),
            Arc::new(MonotonicClock::new()) as Arc<dyn Clock>,
        ));
        Self {
            handle,
            controller,
            metrics,
        }
    }

    fn assert_full(&self, stores: &[u64]) {
        for &store in stores {
            for class in WorkClass::ALL {
                assert_eq!(
                    self.controller.available_tokens(stream(store), class),
                    self.controller
                        .config()
                        .tokens_per_stream(class)
                        .as_delta(),
                    "s{store} {class} bucket not full"
                );
            }
        }
    }
}

const fn pos(index: u64) -> LogPosition {
    LogPosition::new(1, index)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bucket_backpressure_end_to_end() {
    init_tracing();
    let fixture = BucketFixture::new(FlowControlConfig::for_testing());
    for &store in replicas::THREE {
        fixture.handle.connect_stream(pos(0), stream(store));
    }

    let last_index = Arc::new(Mutex::new(0_u64));
    let applied = Arc::new(AtomicU64::new(0));
    let stop = CancellationToken::new();

    let proposer = {
        let handle = Arc::clone(&fixture.handle);
        let last_index = Arc::clone(&last_index);
        tokio::spawn(async move {
            for _ in 0..40 {
                handle
                    .admit(WorkPriority::Normal, 0, &CancellationToken::new())
                    .await
                    .unwrap();
                let mut last_index = last_index.lock();
                *last_index += 1;
                handle.deduct_tokens_for(WorkPriority::Normal, pos(*last_index), Tokens::new(300));
            }
        })
    };

    // Applies proposals with a lag, returning tokens as it goes.
    let follower = {
        let handle = Arc::clone(&fixture.handle);
        let last_index = Arc::clone(&last_index);
        let applied = Arc::clone(&applied);
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let upto = *last_index.lock();
                for &store in replicas::THREE {
                    handle.return_tokens_upto(WorkPriority::Normal, pos(upto), stream(store));
                }
                applied.store(upto, Ordering::Release);
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(30), proposer)
        .await
        .expect("proposer should make progress as tokens return")
        .unwrap();

    // Let the follower catch up with the last proposal, then stop it.
    tokio::time::timeout(Duration::from_secs(10), async {
        while applied.load(Ordering::Acquire) < 40 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("follower should catch up");
    stop.cancel();
    follower.await.unwrap();

    fixture.assert_full(replicas::THREE);
    assert_eq!(fixture.handle.close(), Tokens::ZERO);

    let metrics = fixture.metrics.snapshot(WorkClass::Regular);
    assert_eq!(metrics.requests_admitted, 40);
    assert_eq!(metrics.requests_waiting, 0);
}

#[tokio::test]
async fn test_bucket_elastic_waits_while_regular_bypasses() {
    init_tracing();
    let config = FlowControlConfig::for_testing().with_mode(FlowControlMode::ApplyToElastic);
    let fixture = BucketFixture::new(config);
    fixture.handle.connect_stream(pos(0), stream(1));

    // Regular work drains the elastic pool too.
    fixture
        .handle
        .deduct_tokens_for(WorkPriority::Normal, pos(1), Tokens::new(600));
    assert!(!fixture.handle.try_admit(WorkPriority::Low).admitted);
    assert!(fixture.handle.try_admit(WorkPriority::Normal).admitted);

    tokio::time::timeout(
        Duration::from_secs(5),
        fixture
            .handle
            .admit(WorkPriority::High, 0, &CancellationToken::new()),
    )
    .await
    .expect("regular work should not wait")
    .unwrap();

    let waiter = {
        let handle = Arc::clone(&fixture.handle);
        tokio::spawn(async move {
            handle
                .admit(WorkPriority::Low, 0, &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    assert_eq!(
        fixture
            .handle
            .return_tokens_upto(WorkPriority::Normal, pos(1), stream(1)),
        Tokens::new(600)
    );
    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("returned tokens should wake the elastic waiter")
        .unwrap();
    assert_eq!(result, Ok(()));
    fixture.assert_full(&[1]);
}

#[tokio::test]
async fn test_bucket_disconnect_refills_and_releases() {
    init_tracing();
    let fixture = BucketFixture::new(FlowControlConfig::for_testing());
    fixture.handle.connect_stream(pos(0), stream(1));
    fixture.handle.connect_stream(pos(0), stream(2));
    fixture
        .handle
        .deduct_tokens_for(WorkPriority::Normal, pos(1), Tokens::new(2_048));
    assert_eq!(
        fixture
            .controller
            .available_tokens(stream(1), WorkClass::Regular),
        -1_024
    );

    let waiter = {
        let handle = Arc::clone(&fixture.handle);
        tokio::spawn(async move {
            handle
                .admit(WorkPriority::Normal, 0, &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    assert_eq!(fixture.handle.disconnect_stream(stream(1)), Tokens::new(2_048));
    assert_eq!(fixture.handle.disconnect_stream(stream(2)), Tokens::new(2_048));
    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("disconnect should release the waiter")
        .unwrap();
    assert_eq!(result, Ok(()));
    fixture.assert_full(&[1, 2]);
}

#[tokio::test]
async fn test_bucket_shutdown_fails_waiting_admit() {
    init_tracing();
    let fixture = BucketFixture::new(FlowControlConfig::for_testing());
    fixture.handle.connect_stream(pos(0), stream(1));
    fixture
        .handle
        .deduct_tokens_for(WorkPriority::Low, pos(1), Tokens::new(512));

    let waiter = {
        let handle = Arc::clone(&fixture.handle);
        tokio::spawn(async move {
            handle
                .admit(WorkPriority::Low, 0, &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    fixture.controller.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("shutdown should fail the waiter")
        .unwrap();
    assert_eq!(result, Err(FlowError::ControllerShutdown));
    assert_eq!(fixture.metrics.snapshot(WorkClass::Elastic).requests_errored, 1);
    assert_eq!(fixture.handle.close(), Tokens::new(512));
}

#[tokio::test]
async fn test_bucket_disabled_flow_control_has_no_handle() {
    init_tracing();
    let config = FlowControlConfig::for_testing().with_enabled(false);
    let controller = Arc::new(BucketController::new(config.clone()).unwrap());
    let handle = Handle::new_if_enabled(
        &config,
        RangeId::new(1),
        Arc::clone(&controller),
        Arc::new(HandleMetrics::new()),
        Arc::new(MonotonicClock::new()),
    );
    assert!(handle.is_none());

    // Call sites keep working against the absent handle.
    handle.connect_stream(pos(0), stream(1));
    handle.deduct_tokens_for(WorkPriority::Normal, pos(1), Tokens::new(4_096));
    handle
        .admit(WorkPriority::Normal, 0, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(controller.stream_count(), 0);
}
