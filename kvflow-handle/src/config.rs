//! Flow control configuration.

use kvflow_core::{Limits, Tokens, WorkClass};
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;

/// Which work classes are subject to flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControlMode {
    /// Only elastic work waits for flow tokens. Regular work is admitted
    /// immediately, though its deductions are still accounted for.
    #[default]
    ApplyToElastic,
    /// Both regular and elastic work wait for flow tokens.
    ApplyToAll,
}

impl FlowControlMode {
    /// Returns true if work of the given class has to wait for tokens.
    #[must_use]
    pub const fn applies_to(self, class: WorkClass) -> bool {
        match self {
            Self::ApplyToAll => true,
            Self::ApplyToElastic => matches!(class, WorkClass::Elastic),
        }
    }
}

/// Configuration for replication flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    /// Whether leaders create flow handles at all.
    pub enabled: bool,

    /// Which work classes wait for tokens.
    pub mode: FlowControlMode,

    /// Flow tokens available per stream for regular work.
    pub regular_tokens_per_stream: Tokens,

    /// Flow tokens available per stream for elastic work.
    pub elastic_tokens_per_stream: Tokens,
}

impl FlowControlConfig {
    /// Creates a configuration with the given per-stream token pools.
    #[must_use]
    pub const fn new(regular_tokens_per_stream: Tokens, elastic_tokens_per_stream: Tokens) -> Self {
        Self {
            enabled: true,
            mode: FlowControlMode::ApplyToElastic,
            regular_tokens_per_stream,
            elastic_tokens_per_stream,
        }
    }

    /// Sets whether flow control is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the flow control mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: FlowControlMode) -> Self {
        self.mode = mode;
        self
    }

    /// Creates a configuration for testing: small pools so that tests can
    /// exhaust them, and every class subject to flow control.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            enabled: true,
            mode: FlowControlMode::ApplyToAll,
            regular_tokens_per_stream: Tokens::new(1024),
            elastic_tokens_per_stream: Tokens::new(512),
        }
    }

    /// Returns the configured pool size for a work class.
    #[must_use]
    pub const fn tokens_per_stream(&self, class: WorkClass) -> Tokens {
        match class {
            WorkClass::Regular => self.regular_tokens_per_stream,
            WorkClass::Elastic => self.elastic_tokens_per_stream,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if a pool is empty or the elastic
    /// pool is larger than the regular one.
    pub fn validate(&self) -> FlowResult<()> {
        let limits = Limits {
            regular_tokens_per_stream: self.regular_tokens_per_stream,
            elastic_tokens_per_stream: self.elastic_tokens_per_stream,
            ..Limits::new()
        };
        limits.validate()?;
        Ok(())
    }
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        let limits = Limits::new();
        Self::new(
            limits.regular_tokens_per_stream,
            limits.elastic_tokens_per_stream,
        )
    }
}
