//! Raft log positions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of an entry in the replicated log.
///
/// Positions order by term first, then index. Flow token deductions are keyed
/// by the position of the entry they were deducted for, and released once
/// that position is admitted on the destination.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct LogPosition {
    /// Raft term the entry was proposed in.
    pub term: u64,
    /// Raft log index of the entry.
    pub index: u64,
}

impl LogPosition {
    /// Creates a log position.
    #[must_use]
    pub const fn new(term: u64, index: u64) -> Self {
        Self { term, index }
    }
}

impl fmt::Debug for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "log-position={}/{}", self.term, self.index)
    }
}
