//! Per-stream flow token buckets.
//!
//! Each stream has one bucket per work class. Unlike a rate limiter, tokens
//! are not refilled over time: they are debited when a write is proposed and
//! credited back when the destination admits it. Balances may go negative,
//! since deductions happen after admission and are never refused. Admission
//! waits while the balance for the caller's class is not positive.
//!
//! Regular work debits both the regular and the elastic bucket, so elastic
//! work backs off as soon as regular work uses up capacity.

use kvflow_core::{Tokens, WorkClass};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::FlowControlConfig;
use crate::connected_stream::ConnectedStream;
use crate::error::{FlowError, FlowResult};

/// Flow token buckets for a single stream.
#[derive(Debug)]
pub struct TokenBucket {
    /// Current balance per work class. May be negative.
    tokens: Mutex<[i64; WorkClass::COUNT]>,

    /// Maximum balance per work class.
    limits: [i64; WorkClass::COUNT],

    /// Wakes waiters whenever tokens are credited.
    credited: Notify,
}

impl TokenBucket {
    /// Creates a full bucket sized from the configuration.
    #[must_use]
    pub fn new(config: &FlowControlConfig) -> Self {
        let limits = WorkClass::ALL.map(|class| config.tokens_per_stream(class).as_delta());
        Self {
            tokens: Mutex::new(limits),
            limits,
            credited: Notify::new(),
        }
    }

    /// Returns the current balance for a work class.
    #[must_use]
    pub fn available(&self, class: WorkClass) -> i64 {
        self.tokens.lock()[class.index()]
    }

    /// Returns the maximum balance for a work class.
    #[must_use]
    pub const fn limit(&self, class: WorkClass) -> i64 {
        self.limits[class.index()]
    }

    /// Returns true if work of `class` could be admitted right now.
    #[must_use]
    pub fn has_capacity(&self, class: WorkClass) -> bool {
        self.available(class) > 0
    }

    /// Debits tokens for work of `class`.
    pub fn deduct(&self, class: WorkClass, tokens: Tokens) {
        self.adjust(class, -tokens.as_delta());
    }

    /// Credits tokens for work of `class`, capped at the limit.
    pub fn credit(&self, class: WorkClass, tokens: Tokens) {
        self.adjust(class, tokens.as_delta());
        self.credited.notify_waiters();
    }

    fn adjust(&self, class: WorkClass, delta: i64) {
        let mut tokens = self.tokens.lock();
        let classes: &[WorkClass] = match class {
            WorkClass::Regular => &WorkClass::ALL,
            WorkClass::Elastic => &[WorkClass::Elastic],
        };
        for class in classes {
            let i = class.index();
            tokens[i] = tokens[i].saturating_add(delta);
            if delta > 0 {
                tokens[i] = tokens[i].min(self.limits[i]);
            }
        }
    }

    /// Waits until work of `class` has capacity on this bucket.
    ///
    /// Returns early with `Ok` if `connection` is disconnected, since there
    /// is nothing left to protect.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Cancelled` if `cancel` fires first, or
    /// `FlowError::ControllerShutdown` if `shutdown` does.
    pub async fn wait_for_capacity(
        &self,
        class: WorkClass,
        connection: &ConnectedStream,
        cancel: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> FlowResult<()> {
        loop {
            // Register before checking so a credit between the check and the
            // wait is not missed.
            let notified = self.credited.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.has_capacity(class) {
                return Ok(());
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => {
                    return Err(FlowError::Cancelled { stream: connection.stream() });
                }
                () = shutdown.cancelled() => return Err(FlowError::ControllerShutdown),
                () = connection.disconnected() => return Ok(()),
            }
        }
    }
}
