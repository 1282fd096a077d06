//! Error types for kvflow core values.
//!
//! Only value-level validation lives here. Flow control failures are
//! described by `kvflow_handle::FlowError`.

use std::fmt;

/// The result type for core validation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating core values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// A value was outside its permitted range.
    OutOfRange {
        /// What was out of range.
        what: &'static str,
        /// The value that was rejected.
        value: i64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::OutOfRange { what, value } => write!(f, "{what} out of range: {value}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument {
            name: "elastic_tokens_per_stream",
            reason: "must be positive",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'elastic_tokens_per_stream': must be positive"
        );
    }

    #[test]
    fn test_out_of_range_display() {
        let err = Error::OutOfRange {
            what: "work priority",
            value: 200,
        };
        let msg = format!("{err}");
        assert!(msg.contains("work priority"));
        assert!(msg.contains("200"));
    }
}
