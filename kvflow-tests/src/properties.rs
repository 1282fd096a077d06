//! Property definitions and checkers for flow handle tests.
//!
//! Properties are invariants that must hold at every quiescent point of a
//! test: after each operation in a sequential run, and after every task has
//! finished in a concurrent one.

use std::collections::HashMap;

use kvflow_core::{Stream, WorkPriority};
use kvflow_handle::HandleSnapshot;

use crate::recording_controller::RecordingController;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a flow token accounting property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Tokens were deducted and neither returned nor still tracked.
    TokensLeaked {
        /// The stream the tokens were deducted from.
        stream: Stream,
        /// The priority they were deducted at.
        priority: WorkPriority,
        /// Total deducted.
        deducted: u64,
        /// Total returned.
        returned: u64,
        /// Total the handle still tracks.
        outstanding: u64,
    },
    /// More tokens were returned than were ever deducted.
    OverReturned {
        /// The stream the tokens were returned to.
        stream: Stream,
        /// The priority they were returned at.
        priority: WorkPriority,
        /// Total deducted.
        deducted: u64,
        /// Total returned.
        returned: u64,
    },
    /// Connected streams are not in admission order.
    UnsortedConnections {
        /// The streams as the handle reports them.
        streams: Vec<Stream>,
    },
    /// A closed handle still tracks streams.
    ClosedWithStreams {
        /// The streams still tracked.
        streams: Vec<Stream>,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokensLeaked {
                stream,
                priority,
                deducted,
                returned,
                outstanding,
            } => {
                write!(
                    f,
                    "Tokens leaked on {stream} at {priority}: deducted {deducted}, \
                     returned {returned}, outstanding {outstanding}"
                )
            }
            Self::OverReturned {
                stream,
                priority,
                deducted,
                returned,
            } => {
                write!(
                    f,
                    "Over-returned on {stream} at {priority}: deducted {deducted}, \
                     returned {returned}"
                )
            }
            Self::UnsortedConnections { streams } => {
                write!(f, "Connections out of store order: {streams:?}")
            }
            Self::ClosedWithStreams { streams } => {
                write!(f, "Closed handle still tracks {streams:?}")
            }
        }
    }
}

// ============================================================================
// Property Checks
// ============================================================================

/// Checks that every token deducted is either returned or still tracked by
/// the handle, per stream and priority.
///
/// Assumes the controller is used by a single handle.
#[must_use]
pub fn check_token_conservation(
    controller: &RecordingController,
    snapshot: &HandleSnapshot,
) -> Vec<PropertyViolation> {
    let mut outstanding: HashMap<(Stream, WorkPriority), u64> = HashMap::new();
    for stream in &snapshot.streams {
        for (priority, tokens) in &stream.tracked {
            *outstanding.entry((stream.stream, *priority)).or_default() += tokens.get();
        }
    }

    let mut violations = Vec::new();
    for (stream, priority) in controller.touched() {
        let deducted = controller.deducted_at(stream, priority);
        let returned = controller.returned_at(stream, priority);
        let tracked = outstanding.get(&(stream, priority)).copied().unwrap_or(0);
        if deducted != returned + tracked {
            violations.push(PropertyViolation::TokensLeaked {
                stream,
                priority,
                deducted,
                returned,
                outstanding: tracked,
            });
        }
    }
    violations
}

/// Checks that no stream got back more than was taken from it.
#[must_use]
pub fn check_no_over_return(controller: &RecordingController) -> Vec<PropertyViolation> {
    controller
        .touched()
        .into_iter()
        .filter_map(|(stream, priority)| {
            let deducted = controller.deducted_at(stream, priority);
            let returned = controller.returned_at(stream, priority);
            (returned > deducted).then_some(PropertyViolation::OverReturned {
                stream,
                priority,
                deducted,
                returned,
            })
        })
        .collect()
}

/// Checks that connected streams are ordered by store, then tenant.
#[must_use]
pub fn check_sorted_connections(streams: &[Stream]) -> Vec<PropertyViolation> {
    let sorted = streams
        .windows(2)
        .all(|w| (w[0].store_id, w[0].tenant_id) <= (w[1].store_id, w[1].tenant_id));
    if sorted {
        Vec::new()
    } else {
        vec![PropertyViolation::UnsortedConnections {
            streams: streams.to_vec(),
        }]
    }
}

/// Checks that a closed handle tracks nothing.
#[must_use]
pub fn check_closed_is_empty(snapshot: &HandleSnapshot) -> Vec<PropertyViolation> {
    if snapshot.closed && !snapshot.streams.is_empty() {
        vec![PropertyViolation::ClosedWithStreams {
            streams: snapshot.streams.iter().map(|s| s.stream).collect(),
        }]
    } else {
        Vec::new()
    }
}

/// Runs every check against a handle's snapshot and its controller.
#[must_use]
pub fn check_all(
    controller: &RecordingController,
    snapshot: &HandleSnapshot,
) -> Vec<PropertyViolation> {
    let streams: Vec<Stream> = snapshot.streams.iter().map(|s| s.stream).collect();
    let mut violations = Vec::new();
    violations.extend(check_token_conservation(controller, snapshot));
    violations.extend(check_no_over_return(controller));
    violations.extend(check_sorted_connections(&streams));
    violations.extend(check_closed_is_empty(snapshot));
    violations
}
