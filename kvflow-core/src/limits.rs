//! Flow control limits.
//!
//! Following TigerStyle: put limits on everything. Token pools per stream are
//! bounded, and so is the number of streams a single handle is expected to
//! track.

use crate::tokens::Tokens;

/// Token pool sizes and handle bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Flow tokens available per stream for regular work.
    pub regular_tokens_per_stream: Tokens,
    /// Flow tokens available per stream for elastic work.
    pub elastic_tokens_per_stream: Tokens,
    /// Expected upper bound on streams connected to one handle. Sizing hint
    /// only; the replication factor bounds it in practice.
    pub max_streams_per_handle: u32,
}

impl Limits {
    /// Creates limits with safe defaults: 16 MiB regular and 8 MiB elastic
    /// tokens per stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regular_tokens_per_stream: Tokens::from_mib(16),
            elastic_tokens_per_stream: Tokens::from_mib(8),
            max_streams_per_handle: 7,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero, or if elastic work would get a
    /// larger pool than regular work.
    pub fn validate(&self) -> crate::Result<()> {
        if self.regular_tokens_per_stream.is_zero() {
            return Err(crate::Error::InvalidArgument {
                name: "regular_tokens_per_stream",
                reason: "must be positive",
            });
        }

        if self.elastic_tokens_per_stream.is_zero() {
            return Err(crate::Error::InvalidArgument {
                name: "elastic_tokens_per_stream",
                reason: "must be positive",
            });
        }

        // Regular deductions also debit the elastic pool.
        if self.elastic_tokens_per_stream > self.regular_tokens_per_stream {
            return Err(crate::Error::InvalidArgument {
                name: "elastic_tokens_per_stream",
                reason: "must be <= regular_tokens_per_stream",
            });
        }

        if self.max_streams_per_handle == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_streams_per_handle",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
