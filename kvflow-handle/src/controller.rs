//! Flow token controllers.
//!
//! A `Controller` owns the token pools for every stream on a store. Flow
//! handles consult it once per connected stream: `admit` to wait for
//! capacity, `deduct_tokens` when a write is proposed and `return_tokens`
//! when it is admitted on the destination (or the stream goes away).
//!
//! `BucketController` is the in-process implementation, keeping one
//! [`TokenBucket`] per stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kvflow_core::{Stream, Tokens, WorkClass, WorkPriority};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{FlowControlConfig, FlowControlMode};
use crate::connected_stream::ConnectedStream;
use crate::error::FlowResult;
use crate::token_bucket::TokenBucket;

/// Token accounting backend consulted by flow handles.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Waits until `connection` has capacity for work at `priority`.
    ///
    /// # Errors
    ///
    /// Returns an error if `cancel` fires first or the controller aborts.
    /// Nothing is deducted either way.
    async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        connection: &ConnectedStream,
        cancel: &CancellationToken,
    ) -> FlowResult<()>;

    /// Debits `tokens` from `stream`. Never blocks and never refuses.
    fn deduct_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream);

    /// Credits `tokens` back to `stream`.
    fn return_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream);
}

/// Controllers that can answer admission without waiting. Used by tests that
/// drive admission step by step.
pub trait NonBlockingController: Controller {
    /// Returns true if `connection` has capacity for work at `priority` now.
    fn try_admit(&self, priority: WorkPriority, connection: &ConnectedStream) -> bool;
}

/// In-process controller with one token bucket per stream.
///
/// Buckets are created full on first use and live for the lifetime of the
/// controller.
#[derive(Debug)]
pub struct BucketController {
    config: FlowControlConfig,
    buckets: Mutex<HashMap<Stream, Arc<TokenBucket>>>,
    shutdown: CancellationToken,
}

impl BucketController {
    /// Creates a controller.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: FlowControlConfig) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FlowControlConfig {
        &self.config
    }

    /// Returns the current balance of `stream` for `class`. Streams never
    /// seen before report a full bucket.
    #[must_use]
    pub fn available_tokens(&self, stream: Stream, class: WorkClass) -> i64 {
        self.bucket(stream).available(class)
    }

    /// Returns the number of streams with a bucket.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Fails every current and future wait with
    /// `FlowError::ControllerShutdown`.
    pub fn shutdown(&self) {
        debug!("shutting down flow token controller");
        self.shutdown.cancel();
    }

    fn bucket(&self, stream: Stream) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock();
        Arc::clone(
            buckets
                .entry(stream)
                .or_insert_with(|| Arc::new(TokenBucket::new(&self.config))),
        )
    }

    fn bypasses(&self, class: WorkClass) -> bool {
        !self.config.mode.applies_to(class)
    }
}

#[async_trait]
impl Controller for BucketController {
    async fn admit(
        &self,
        priority: WorkPriority,
        _create_time_us: u64,
        connection: &ConnectedStream,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        let class = priority.work_class();
        if self.bypasses(class) {
            return Ok(());
        }

        let bucket = self.bucket(connection.stream());
        bucket
            .wait_for_capacity(class, connection, cancel, &self.shutdown)
            .await
    }

    fn deduct_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream) {
        self.bucket(stream).deduct(priority.work_class(), tokens);
    }

    fn return_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream) {
        self.bucket(stream).credit(priority.work_class(), tokens);
    }
}

impl NonBlockingController for BucketController {
    fn try_admit(&self, priority: WorkPriority, connection: &ConnectedStream) -> bool {
        let class = priority.work_class();
        self.bypasses(class)
            || connection.is_disconnected()
            || self.bucket(connection.stream()).has_capacity(class)
    }
}
