//! Flow control error types.

use kvflow_core::Stream;

/// Flow control error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The caller's cancellation fired while waiting for flow tokens.
    #[error("admission cancelled while waiting for flow tokens on stream {stream}")]
    Cancelled {
        /// The stream that was being waited on.
        stream: Stream,
    },

    /// The token controller shut down while a caller was waiting on it.
    #[error("flow token controller shut down")]
    ControllerShutdown,

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl From<kvflow_core::Error> for FlowError {
    fn from(err: kvflow_core::Error) -> Self {
        Self::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Result type for flow control operations.
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use kvflow_core::{StoreId, TenantId};

    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::Cancelled {
            stream: Stream::new(TenantId::new(2), StoreId::new(9)),
        };
        assert!(err.to_string().contains("t2/s9"));

        let err = FlowError::from(kvflow_core::Error::InvalidArgument {
            name: "regular_tokens_per_stream",
            reason: "must be positive",
        });
        assert!(matches!(err, FlowError::InvalidConfig { .. }));
        assert!(err.to_string().contains("regular_tokens_per_stream"));
    }
}
