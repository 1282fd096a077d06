//! Per-leader flow handle.
//!
//! A `Handle` is held by the leaseholder and leader of a range for as long as
//! it is both. It tracks one [`ConnectedStream`] per replica being replicated
//! to and a [`Tracker`] of outstanding token deductions for each:
//!
//! ```text
//!   admit ──▶ propose ──▶ deduct_tokens_for(pos) ──▶ ... ──▶ return_tokens_upto(pos)
//!                                  │                                 ▲
//!                                  ▼                                 │
//!                        Tracker per stream ──── disconnect / close ─┘
//! ```
//!
//! # Locking
//!
//! One mutex guards the connections, trackers and closed flag. `admit` holds
//! it only long enough to copy the connection list: waiting for tokens may
//! take arbitrarily long and must not stall deductions and returns. Every
//! other operation runs to completion under the lock and never waits.
//!
//! Connections are kept sorted by store so that `admit` always waits on
//! streams in the same order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kvflow_core::{LogPosition, RangeId, Stream, Tokens, WorkPriority};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::config::FlowControlConfig;
use crate::connected_stream::ConnectedStream;
use crate::controller::{Controller, NonBlockingController};
use crate::error::FlowResult;
use crate::flow_handle::FlowHandle;
use crate::metrics::HandleMetrics;
use crate::tracker::Tracker;

/// State guarded by the handle's mutex.
#[derive(Debug, Default)]
struct HandleState {
    /// Connected streams, sorted by store.
    connections: Vec<ConnectedStream>,
    /// Outstanding deductions per connected stream.
    trackers: HashMap<Stream, Tracker>,
    closed: bool,
}

/// Flow handle for the leader of a single range.
pub struct Handle<C: Controller> {
    range_id: RangeId,
    controller: Arc<C>,
    metrics: Arc<HandleMetrics>,
    clock: Arc<dyn Clock>,
    state: Mutex<HandleState>,
}

impl<C: Controller> Handle<C> {
    /// Creates a handle with no connected streams.
    #[must_use]
    pub fn new(
        range_id: RangeId,
        controller: Arc<C>,
        metrics: Arc<HandleMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            range_id,
            controller,
            metrics,
            clock,
            state: Mutex::new(HandleState::default()),
        }
    }

    /// Creates a handle if flow control is enabled, and `None` otherwise.
    #[must_use]
    pub fn new_if_enabled(
        config: &FlowControlConfig,
        range_id: RangeId,
        controller: Arc<C>,
        metrics: Arc<HandleMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(range_id, controller, metrics, clock))
    }

    /// Returns the range this handle belongs to.
    #[must_use]
    pub const fn range_id(&self) -> RangeId {
        self.range_id
    }

    /// Waits until every connected stream has capacity for work at
    /// `priority`, in store order.
    ///
    /// Streams connected while waiting are not waited on; streams
    /// disconnected while waiting stop being waited on.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the controller, typically
    /// `FlowError::Cancelled`. Streams after the failing one are not
    /// consulted, and no tokens are deducted.
    pub async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        let connections = {
            let state = self.state.lock();
            if state.closed {
                warn!(range = %self.range_id, "operating on a closed handle");
                return Ok(());
            }
            state.connections.clone()
        };

        let class = priority.work_class();
        self.metrics.on_waiting(class);
        let start_us = self.clock.now_us();

        for connection in &connections {
            if let Err(err) = self
                .controller
                .admit(priority, create_time_us, connection, cancel)
                .await
            {
                self.metrics.on_errored(class, self.clock.elapsed_us(start_us));
                return Err(err);
            }
        }

        self.metrics.on_admitted(class, self.clock.elapsed_us(start_us));
        Ok(())
    }

    /// Deducts `tokens` from every connected stream for the entry at
    /// `position`.
    pub fn deduct_tokens_for(&self, priority: WorkPriority, position: LogPosition, tokens: Tokens) {
        let _ = self.deduct_tokens_for_streams(priority, position, tokens);
    }

    /// Like [`deduct_tokens_for`](Self::deduct_tokens_for), returning the
    /// streams the deduction is now tracked against.
    ///
    /// A stream whose lower bound is at or above `position` gets its tokens
    /// back immediately and is left out.
    pub fn deduct_tokens_for_streams(
        &self,
        priority: WorkPriority,
        position: LogPosition,
        tokens: Tokens,
    ) -> Vec<Stream> {
        let mut guard = self.state.lock();
        if guard.closed {
            warn!(range = %self.range_id, "operating on a closed handle");
            return Vec::new();
        }

        let state = &mut *guard;
        let mut streams = Vec::with_capacity(state.connections.len());
        for connection in &state.connections {
            let stream = connection.stream();
            let Some(tracker) = state.trackers.get_mut(&stream) else {
                error!(range = %self.range_id, %stream, "connected stream has no tracker");
                panic!("connected stream {stream} has no tracker");
            };

            self.controller.deduct_tokens(priority, tokens, stream);
            if tracker.track(priority, tokens, position) {
                streams.push(stream);
            } else {
                self.controller.return_tokens(priority, tokens, stream);
            }
        }
        streams
    }

    /// Returns the tokens deducted at `priority` on `stream` for entries up
    /// to and including `upto`.
    ///
    /// Unknown streams are ignored: their tokens were returned when they
    /// were disconnected.
    pub fn return_tokens_upto(
        &self,
        priority: WorkPriority,
        upto: LogPosition,
        stream: Stream,
    ) -> Tokens {
        let mut state = self.state.lock();
        if state.closed {
            warn!(range = %self.range_id, "operating on a closed handle");
            return Tokens::ZERO;
        }

        let Some(tracker) = state.trackers.get_mut(&stream) else {
            debug!(range = %self.range_id, %stream, %upto, "ignoring token return for unknown stream");
            return Tokens::ZERO;
        };

        let tokens = tracker.untrack(priority, upto);
        if !tokens.is_zero() {
            self.controller.return_tokens(priority, tokens, stream);
        }
        tokens
    }

    /// Connects `stream`. Deductions at or below `lower_bound` are not
    /// tracked against it.
    ///
    /// # Panics
    ///
    /// Panics if `stream` is already connected.
    pub fn connect_stream(&self, lower_bound: LogPosition, stream: Stream) {
        let mut state = self.state.lock();
        if state.closed {
            warn!(range = %self.range_id, "operating on a closed handle");
            return;
        }

        if state.trackers.contains_key(&stream) {
            error!(range = %self.range_id, %stream, "reconnecting already connected stream");
            panic!("reconnecting already connected stream: {stream}");
        }

        state.connections.push(ConnectedStream::new(stream));
        state
            .connections
            .sort_by_key(|c| (c.stream().store_id, c.stream().tenant_id));
        state.trackers.insert(stream, Tracker::new(lower_bound));
        debug!(range = %self.range_id, %stream, %lower_bound, "connected stream");
    }

    /// Disconnects `stream`, returning every token still deducted from it
    /// regardless of position. Returns the amount released.
    ///
    /// # Panics
    ///
    /// Panics if `stream` is not connected.
    pub fn disconnect_stream(&self, stream: Stream) -> Tokens {
        let mut state = self.state.lock();
        if state.closed {
            warn!(range = %self.range_id, "operating on a closed handle");
            return Tokens::ZERO;
        }
        self.disconnect_stream_locked(&mut state, stream)
    }

    fn disconnect_stream_locked(&self, state: &mut HandleState, stream: Stream) -> Tokens {
        let Some(tracker) = state.trackers.remove(&stream) else {
            error!(range = %self.range_id, %stream, "disconnecting non-existent stream");
            panic!("disconnecting non-existent stream: {stream}");
        };

        let mut returned = Tokens::ZERO;
        tracker.iter(|priority, tokens| {
            self.controller.return_tokens(priority, tokens, stream);
            returned += tokens;
        });

        if let Some(i) = state.connections.iter().position(|c| c.stream() == stream) {
            state.connections.remove(i).disconnect();
        }

        debug!(range = %self.range_id, %stream, %returned, "disconnected stream");
        returned
    }

    /// Disconnects every stream and closes the handle. Every later call is a
    /// logged no-op. Returns the amount released.
    pub fn close(&self) -> Tokens {
        let mut state = self.state.lock();
        if state.closed {
            warn!(range = %self.range_id, "operating on a closed handle");
            return Tokens::ZERO;
        }

        let streams: Vec<Stream> = state.connections.iter().map(ConnectedStream::stream).collect();
        let mut returned = Tokens::ZERO;
        for stream in streams {
            returned += self.disconnect_stream_locked(&mut state, stream);
        }
        state.closed = true;

        debug!(range = %self.range_id, %returned, "closed flow handle");
        returned
    }

    /// Returns true once the handle is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the connected streams in admission order.
    #[must_use]
    pub fn connected_streams(&self) -> Vec<Stream> {
        self.state
            .lock()
            .connections
            .iter()
            .map(ConnectedStream::stream)
            .collect()
    }

    /// Returns a snapshot of the connected streams and what is outstanding
    /// on each.
    #[must_use]
    pub fn inspect(&self) -> HandleSnapshot {
        let state = self.state.lock();
        let streams = state
            .connections
            .iter()
            .filter_map(|connection| {
                let stream = connection.stream();
                let tracker = state.trackers.get(&stream)?;
                let mut tracked = Vec::new();
                tracker.iter(|priority, tokens| tracked.push((priority, tokens)));
                Some(StreamSnapshot {
                    stream,
                    lower_bound: tracker.lower_bound(),
                    tracked,
                })
            })
            .collect();

        HandleSnapshot {
            range_id: self.range_id,
            closed: state.closed,
            streams,
        }
    }
}

impl<C: NonBlockingController> Handle<C> {
    /// Checks, without waiting, whether every connected stream has capacity
    /// for work at `priority`. Reports the streams that do not.
    pub fn try_admit(&self, priority: WorkPriority) -> NonBlockingAdmit {
        let connections = {
            let state = self.state.lock();
            if state.closed {
                warn!(range = %self.range_id, "operating on a closed handle");
                return NonBlockingAdmit {
                    admitted: true,
                    blocked: Vec::new(),
                };
            }
            state.connections.clone()
        };

        let blocked: Vec<ConnectedStream> = connections
            .into_iter()
            .filter(|connection| !self.controller.try_admit(priority, connection))
            .collect();

        let admitted = blocked.is_empty();
        if admitted {
            let class = priority.work_class();
            self.metrics.on_waiting(class);
            self.metrics.on_admitted(class, 0);
        }
        NonBlockingAdmit { admitted, blocked }
    }
}

#[async_trait]
impl<C: Controller> FlowHandle for Handle<C> {
    async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        Self::admit(self, priority, create_time_us, cancel).await
    }

    fn deduct_tokens_for(&self, priority: WorkPriority, position: LogPosition, tokens: Tokens) {
        Self::deduct_tokens_for(self, priority, position, tokens);
    }

    fn return_tokens_upto(
        &self,
        priority: WorkPriority,
        upto: LogPosition,
        stream: Stream,
    ) -> Tokens {
        Self::return_tokens_upto(self, priority, upto, stream)
    }

    fn connect_stream(&self, lower_bound: LogPosition, stream: Stream) {
        Self::connect_stream(self, lower_bound, stream);
    }

    fn disconnect_stream(&self, stream: Stream) -> Tokens {
        Self::disconnect_stream(self, stream)
    }

    fn close(&self) -> Tokens {
        Self::close(self)
    }
}

impl<C: Controller> std::fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Handle")
            .field("range_id", &self.range_id)
            .field("connections", &state.connections)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`Handle::try_admit`].
#[derive(Debug, Clone)]
pub struct NonBlockingAdmit {
    /// True if every connected stream had capacity.
    pub admitted: bool,
    /// Streams without capacity. Empty when admitted.
    pub blocked: Vec<ConnectedStream>,
}

/// Snapshot of a handle, from [`Handle::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSnapshot {
    /// The range the handle belongs to.
    pub range_id: RangeId,
    /// Whether the handle is closed.
    pub closed: bool,
    /// Connected streams in admission order.
    pub streams: Vec<StreamSnapshot>,
}

/// Snapshot of one connected stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    /// The stream.
    pub stream: Stream,
    /// Position the stream was connected at.
    pub lower_bound: LogPosition,
    /// Outstanding tokens per priority, ascending.
    pub tracked: Vec<(WorkPriority, Tokens)>,
}

impl StreamSnapshot {
    /// Returns the tokens outstanding across all priorities.
    #[must_use]
    pub fn total(&self) -> Tokens {
        self.tracked.iter().map(|(_, tokens)| *tokens).sum()
    }
}
