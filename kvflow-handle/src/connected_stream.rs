//! Streams connected to a flow handle.

use std::fmt;

use kvflow_core::Stream;
use tokio_util::sync::CancellationToken;

/// A stream connected to a flow handle.
///
/// Clones share the disconnect signal: the handle disconnects its copy and
/// any controller still waiting on a clone observes it.
#[derive(Clone)]
pub struct ConnectedStream {
    stream: Stream,
    disconnected: CancellationToken,
}

impl ConnectedStream {
    /// Creates a connected stream.
    #[must_use]
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            disconnected: CancellationToken::new(),
        }
    }

    /// Returns the underlying stream.
    #[must_use]
    pub const fn stream(&self) -> Stream {
        self.stream
    }

    /// Marks the stream disconnected, waking anyone waiting on
    /// [`disconnected`](Self::disconnected). Idempotent.
    pub fn disconnect(&self) {
        self.disconnected.cancel();
    }

    /// Returns true once the stream has been disconnected.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.is_cancelled()
    }

    /// Resolves once the stream is disconnected.
    pub async fn disconnected(&self) {
        self.disconnected.cancelled().await;
    }
}

impl fmt::Debug for ConnectedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedStream")
            .field("stream", &self.stream)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
