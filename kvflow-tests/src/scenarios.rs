//! Reusable test scenarios for flow handle tests.
//!
//! Scenarios define common replica layouts and fixtures that tests compose.

use std::sync::Arc;

use kvflow_core::{RangeId, StoreId, Stream, TenantId};
use kvflow_handle::{Clock, Handle, HandleMetrics, ManualClock};

use crate::recording_controller::RecordingController;

/// Standard replica layouts, as stores the leader replicates to.
pub mod replicas {
    /// Three replicas.
    pub const THREE: &[u64] = &[1, 2, 3];

    /// Five replicas, used for membership churn.
    pub const FIVE: &[u64] = &[1, 2, 3, 4, 5];
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to test in CI.
    pub const CI_SEED_COUNT: u32 = 100;
}

/// Returns the stream for `store` under the system tenant.
#[must_use]
pub const fn stream(store: u64) -> Stream {
    Stream::for_store(StoreId::new(store))
}

/// Returns the stream for `store` under `tenant`.
#[must_use]
pub const fn tenant_stream(tenant: u64, store: u64) -> Stream {
    Stream::new(TenantId::new(tenant), StoreId::new(store))
}

/// A handle wired to a recording controller and a manual clock.
#[derive(Debug)]
pub struct Fixture {
    /// The handle under test.
    pub handle: Arc<Handle<RecordingController>>,
    /// The controller the handle draws from.
    pub controller: Arc<RecordingController>,
    /// The handle's metrics.
    pub metrics: Arc<HandleMetrics>,
    /// The handle's clock.
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    /// Creates a fixture for range 1.
    #[must_use]
    pub fn new() -> Self {
        Self::for_range(RangeId::new(1))
    }

    /// Creates a fixture for `range_id`.
    #[must_use]
    pub fn for_range(range_id: RangeId) -> Self {
        let controller = Arc::new(RecordingController::new());
        let metrics = Arc::new(HandleMetrics::new());
        let clock = Arc::new(ManualClock::new(0));
        let handle = Arc::new(Handle::new(
            range_id,
            Arc::clone(&controller),
            Arc::clone(&metrics),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        Self {
            handle,
            controller,
            metrics,
            clock,
        }
    }

    /// Creates another handle for `range_id` drawing from the same
    /// controller, as a new leader of the same range would.
    #[must_use]
    pub fn successor(&self, range_id: RangeId) -> Arc<Handle<RecordingController>> {
        Arc::new(Handle::new(
            range_id,
            Arc::clone(&self.controller),
            Arc::clone(&self.metrics),
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        ))
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
