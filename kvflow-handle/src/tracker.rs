//! Per-stream ledger of outstanding flow token deductions.
//!
//! Every deduction made against a stream is tracked at the log position of
//! the entry it was made for. Deductions are released in position order as
//! the destination admits entries, or drained wholesale when the stream goes
//! away.

use std::collections::{BTreeMap, VecDeque};

use kvflow_core::{LogPosition, Tokens, WorkPriority};
use tracing::{error, warn};

/// A single tracked deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    tokens: Tokens,
    position: LogPosition,
}

/// Ledger of flow token deductions for one connected stream.
///
/// # Invariants
///
/// - Per priority, tracked positions are non-decreasing.
/// - Every tracked position is strictly above the lower bound.
/// - A released deduction is never released again.
#[derive(Debug)]
pub struct Tracker {
    /// Tracked deductions per priority, oldest first.
    tracked: BTreeMap<WorkPriority, VecDeque<Tracked>>,
    /// Position at which the stream was connected. Nothing at or below it
    /// belongs to this ledger.
    lower_bound: LogPosition,
}

impl Tracker {
    /// Creates an empty ledger for a stream connected at `lower_bound`.
    #[must_use]
    pub const fn new(lower_bound: LogPosition) -> Self {
        Self {
            tracked: BTreeMap::new(),
            lower_bound,
        }
    }

    /// Returns the position the ledger was anchored at.
    #[must_use]
    pub const fn lower_bound(&self) -> LogPosition {
        self.lower_bound
    }

    /// Tracks a deduction of `tokens` at `position`.
    ///
    /// Returns false, tracking nothing, if `position` is at or below the
    /// ledger's lower bound; the caller owns those tokens.
    ///
    /// # Panics
    ///
    /// Panics if `position` regresses below the last position tracked at the
    /// same priority.
    pub fn track(&mut self, priority: WorkPriority, tokens: Tokens, position: LogPosition) -> bool {
        if position <= self.lower_bound {
            warn!(
                %position,
                lower_bound = %self.lower_bound,
                "observed raft log position at or below per-stream lower bound"
            );
            return false;
        }

        let deductions = self.tracked.entry(priority).or_default();
        if let Some(last) = deductions.back() {
            if last.position > position {
                error!(last = %last.position, %position, %priority, "tracked log position regressed");
                panic!(
                    "expected in order tracked log positions ({} <= {position})",
                    last.position
                );
            }
        }
        deductions.push_back(Tracked { tokens, position });
        true
    }

    /// Releases every deduction at `priority` with position at or below
    /// `upto`, returning their sum.
    pub fn untrack(&mut self, priority: WorkPriority, upto: LogPosition) -> Tokens {
        let Some(deductions) = self.tracked.get_mut(&priority) else {
            return Tokens::ZERO;
        };

        let mut released = Tokens::ZERO;
        while let Some(front) = deductions.front() {
            if front.position > upto {
                break;
            }
            released += front.tokens;
            deductions.pop_front();
        }

        if deductions.is_empty() {
            self.tracked.remove(&priority);
        }
        released
    }

    /// Visits every priority with outstanding deductions, in ascending
    /// priority order, passing the sum still tracked at that priority.
    pub fn iter<F>(&self, mut f: F)
    where
        F: FnMut(WorkPriority, Tokens),
    {
        for (priority, deductions) in &self.tracked {
            let tokens: Tokens = deductions.iter().map(|d| d.tokens).sum();
            f(*priority, tokens);
        }
    }

    /// Returns the tokens outstanding at `priority`.
    #[must_use]
    pub fn tracked_tokens(&self, priority: WorkPriority) -> Tokens {
        self.tracked
            .get(&priority)
            .map_or(Tokens::ZERO, |d| d.iter().map(|t| t.tokens).sum())
    }

    /// Returns the tokens outstanding across all priorities.
    #[must_use]
    pub fn total_tokens(&self) -> Tokens {
        self.tracked
            .values()
            .flat_map(|d| d.iter().map(|t| t.tokens))
            .sum()
    }

    /// Returns the number of outstanding deductions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracked.values().map(VecDeque::len).sum()
    }

    /// Returns true if nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
