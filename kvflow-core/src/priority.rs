//! Work priorities and the work classes they map onto.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Caller-declared importance of a proposal.
///
/// Variants are declared in ascending order so the derived ordering matches
/// the numeric priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum WorkPriority {
    /// Lowest priority background work.
    Low = -128,
    /// TTL-driven deletions.
    TtlLow = -100,
    /// User-submitted low priority work.
    UserLow = -50,
    /// Default priority.
    Normal = 0,
    /// Normal priority work that holds locks.
    LockingNormal = 10,
    /// User-submitted high priority work.
    UserHigh = 50,
    /// High priority user work that holds locks.
    LockingUserHigh = 100,
    /// Highest priority.
    High = 127,
}

impl WorkPriority {
    /// All priorities in ascending order.
    pub const ALL: [Self; 8] = [
        Self::Low,
        Self::TtlLow,
        Self::UserLow,
        Self::Normal,
        Self::LockingNormal,
        Self::UserHigh,
        Self::LockingUserHigh,
        Self::High,
    ];

    /// Returns the work class this priority is metered under.
    ///
    /// Anything below `Normal` is elastic.
    #[must_use]
    pub const fn work_class(self) -> WorkClass {
        if (self as i8) < (Self::Normal as i8) {
            WorkClass::Elastic
        } else {
            WorkClass::Regular
        }
    }

    /// Returns the numeric priority.
    #[must_use]
    pub const fn value(self) -> i8 {
        self as i8
    }
}

impl TryFrom<i8> for WorkPriority {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.value() == value)
            .ok_or(Error::OutOfRange {
                what: "work priority",
                value: i64::from(value),
            })
    }
}

impl fmt::Display for WorkPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low-pri",
            Self::TtlLow => "ttl-low-pri",
            Self::UserLow => "user-low-pri",
            Self::Normal => "normal-pri",
            Self::LockingNormal => "locking-normal-pri",
            Self::UserHigh => "user-high-pri",
            Self::LockingUserHigh => "locking-user-high-pri",
            Self::High => "high-pri",
        };
        f.write_str(name)
    }
}

/// Bucket of priorities that share a flow token pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkClass {
    /// Foreground work: `Normal` priority and above.
    Regular,
    /// Background work that can be throttled aggressively.
    Elastic,
}

impl WorkClass {
    /// Number of work classes.
    pub const COUNT: usize = 2;

    /// All work classes.
    pub const ALL: [Self; Self::COUNT] = [Self::Regular, Self::Elastic];

    /// Returns a dense index usable for per-class arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Regular => 0,
            Self::Elastic => 1,
        }
    }
}

impl fmt::Display for WorkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("regular"),
            Self::Elastic => f.write_str("elastic"),
        }
    }
}
