//! A token controller that records every call made to it.
//!
//! Admission can be gated per stream: a blocked stream makes `admit` wait
//! until it is unblocked, the caller cancels or the stream disconnects. A
//! failing stream makes `admit` return an error immediately.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kvflow_core::{Stream, Tokens, WorkPriority};
use kvflow_handle::{ConnectedStream, Controller, FlowError, FlowResult, NonBlockingController};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Recorded {
    deducted: HashMap<(Stream, WorkPriority), u64>,
    returned: HashMap<(Stream, WorkPriority), u64>,
    admit_calls: Vec<Stream>,
}

#[derive(Debug, Default)]
struct Gates {
    blocked: HashSet<Stream>,
    failing: HashSet<Stream>,
}

/// Controller test double.
#[derive(Debug, Default)]
pub struct RecordingController {
    recorded: Mutex<Recorded>,
    gates: Mutex<Gates>,
    gates_changed: Notify,
}

impl RecordingController {
    /// Creates a controller that admits everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `admit` wait on `stream` until [`unblock`](Self::unblock).
    pub fn block(&self, stream: Stream) {
        self.gates.lock().blocked.insert(stream);
    }

    /// Lets waiters on `stream` through.
    pub fn unblock(&self, stream: Stream) {
        self.gates.lock().blocked.remove(&stream);
        self.gates_changed.notify_waiters();
    }

    /// Makes `admit` on `stream` fail with `FlowError::ControllerShutdown`.
    pub fn fail(&self, stream: Stream) {
        self.gates.lock().failing.insert(stream);
    }

    /// Streams passed to `admit`, in call order.
    #[must_use]
    pub fn admit_calls(&self) -> Vec<Stream> {
        self.recorded.lock().admit_calls.clone()
    }

    /// Clears the admit call log.
    pub fn clear_admit_calls(&self) {
        self.recorded.lock().admit_calls.clear();
    }

    /// Total deducted from `stream` at `priority`.
    #[must_use]
    pub fn deducted_at(&self, stream: Stream, priority: WorkPriority) -> u64 {
        self.recorded
            .lock()
            .deducted
            .get(&(stream, priority))
            .copied()
            .unwrap_or(0)
    }

    /// Total returned to `stream` at `priority`.
    #[must_use]
    pub fn returned_at(&self, stream: Stream, priority: WorkPriority) -> u64 {
        self.recorded
            .lock()
            .returned
            .get(&(stream, priority))
            .copied()
            .unwrap_or(0)
    }

    /// Total deducted from `stream` across priorities.
    #[must_use]
    pub fn deducted(&self, stream: Stream) -> u64 {
        WorkPriority::ALL
            .iter()
            .map(|p| self.deducted_at(stream, *p))
            .sum()
    }

    /// Total returned to `stream` across priorities.
    #[must_use]
    pub fn returned(&self, stream: Stream) -> u64 {
        WorkPriority::ALL
            .iter()
            .map(|p| self.returned_at(stream, *p))
            .sum()
    }

    /// Every (stream, priority) pair that saw a deduction or a return.
    #[must_use]
    pub fn touched(&self) -> Vec<(Stream, WorkPriority)> {
        let recorded = self.recorded.lock();
        let mut keys: Vec<_> = recorded
            .deducted
            .keys()
            .chain(recorded.returned.keys())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        keys.sort_by_key(|(stream, priority)| (stream.store_id, stream.tenant_id, *priority));
        keys
    }

    fn gate(&self, stream: Stream) -> (bool, bool) {
        let gates = self.gates.lock();
        (gates.blocked.contains(&stream), gates.failing.contains(&stream))
    }
}

#[async_trait]
impl Controller for RecordingController {
    async fn admit(
        &self,
        _priority: WorkPriority,
        _create_time_us: u64,
        connection: &ConnectedStream,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        let stream = connection.stream();
        self.recorded.lock().admit_calls.push(stream);

        loop {
            let notified = self.gates_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.gate(stream) {
                (_, true) => return Err(FlowError::ControllerShutdown),
                (false, false) => return Ok(()),
                (true, false) => {}
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => return Err(FlowError::Cancelled { stream }),
                () = connection.disconnected() => return Ok(()),
            }
        }
    }

    fn deduct_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream) {
        *self
            .recorded
            .lock()
            .deducted
            .entry((stream, priority))
            .or_default() += tokens.get();
    }

    fn return_tokens(&self, priority: WorkPriority, tokens: Tokens, stream: Stream) {
        *self
            .recorded
            .lock()
            .returned
            .entry((stream, priority))
            .or_default() += tokens.get();
    }
}

impl NonBlockingController for RecordingController {
    fn try_admit(&self, _priority: WorkPriority, connection: &ConnectedStream) -> bool {
        connection.is_disconnected() || self.gate(connection.stream()) == (false, false)
    }
}
