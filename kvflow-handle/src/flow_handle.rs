//! The flow handle interface, and absent handles.
//!
//! Replicas that are not yet (or no longer) leaseholder and leader have no
//! flow handle. Call sites hold an `Option` and call through it: `None`
//! admits immediately and ignores everything else, so proposals are never
//! failed just because flow control is not active for the range.

use std::sync::Arc;

use async_trait::async_trait;
use kvflow_core::{LogPosition, Stream, Tokens, WorkPriority};
use tokio_util::sync::CancellationToken;

use crate::error::FlowResult;

/// Flow control for replicated writes proposed by one leader.
#[async_trait]
pub trait FlowHandle: Send + Sync {
    /// Waits until every connected stream has capacity for work at
    /// `priority`.
    ///
    /// # Errors
    ///
    /// Returns the first error reported while waiting, typically because
    /// `cancel` fired.
    async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        cancel: &CancellationToken,
    ) -> FlowResult<()>;

    /// Deducts `tokens` from every connected stream for the entry at
    /// `position`.
    fn deduct_tokens_for(&self, priority: WorkPriority, position: LogPosition, tokens: Tokens);

    /// Returns the tokens deducted at `priority` for entries up to and
    /// including `upto` on `stream`. Returns the amount released.
    fn return_tokens_upto(&self, priority: WorkPriority, upto: LogPosition, stream: Stream)
        -> Tokens;

    /// Starts tracking `stream`, accounting for entries above `lower_bound`.
    fn connect_stream(&self, lower_bound: LogPosition, stream: Stream);

    /// Stops tracking `stream`, returning everything still deducted from it.
    fn disconnect_stream(&self, stream: Stream) -> Tokens;

    /// Disconnects every stream and closes the handle for good.
    fn close(&self) -> Tokens;
}

#[async_trait]
impl<H: FlowHandle + ?Sized> FlowHandle for Arc<H> {
    async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        (**self).admit(priority, create_time_us, cancel).await
    }

    fn deduct_tokens_for(&self, priority: WorkPriority, position: LogPosition, tokens: Tokens) {
        (**self).deduct_tokens_for(priority, position, tokens);
    }

    fn return_tokens_upto(
        &self,
        priority: WorkPriority,
        upto: LogPosition,
        stream: Stream,
    ) -> Tokens {
        (**self).return_tokens_upto(priority, upto, stream)
    }

    fn connect_stream(&self, lower_bound: LogPosition, stream: Stream) {
        (**self).connect_stream(lower_bound, stream);
    }

    fn disconnect_stream(&self, stream: Stream) -> Tokens {
        (**self).disconnect_stream(stream)
    }

    fn close(&self) -> Tokens {
        (**self).close()
    }
}

/// An absent handle admits everything and tracks nothing. Returning tokens
/// through it is fine: whatever was deducted was already returned when the
/// handle it came from was closed.
#[async_trait]
impl<H: FlowHandle> FlowHandle for Option<H> {
    async fn admit(
        &self,
        priority: WorkPriority,
        create_time_us: u64,
        cancel: &CancellationToken,
    ) -> FlowResult<()> {
        match self {
            Some(handle) => handle.admit(priority, create_time_us, cancel).await,
            None => Ok(()),
        }
    }

    fn deduct_tokens_for(&self, priority: WorkPriority, position: LogPosition, tokens: Tokens) {
        if let Some(handle) = self {
            handle.deduct_tokens_for(priority, position, tokens);
        }
    }

    fn return_tokens_upto(
        &self,
        priority: WorkPriority,
        upto: LogPosition,
        stream: Stream,
    ) -> Tokens {
        self.as_ref()
            .map_or(Tokens::ZERO, |handle| handle.return_tokens_upto(priority, upto, stream))
    }

    fn connect_stream(&self, lower_bound: LogPosition, stream: Stream) {
        if let Some(handle) = self {
            handle.connect_stream(lower_bound, stream);
        }
    }

    fn disconnect_stream(&self, stream: Stream) -> Tokens {
        self.as_ref()
            .map_or(Tokens::ZERO, |handle| handle.disconnect_stream(stream))
    }

    fn close(&self) -> Tokens {
        self.as_ref().map_or(Tokens::ZERO, |handle| handle.close())
    }
}
