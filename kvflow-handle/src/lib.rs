//! Replication flow control for kvflow.
//!
//! This crate admission-controls and token-accounts replicated write traffic
//! sent by a range's leader to its replicas. It includes:
//!
//! - **Flow handle**: per-leader admission, deduction and return of flow
//!   tokens across a dynamic set of connected streams.
//! - **Tracker**: per-stream ledger of deductions keyed by log position.
//! - **Token controller**: the store-wide token pools handles draw from.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Handle (per range)                       │
//! │                                                                  │
//! │  ┌─────────────────┐   ┌─────────────────┐                       │
//! │  │ ConnectedStream │   │ ConnectedStream │   sorted by store     │
//! │  │    + Tracker    │   │    + Tracker    │                       │
//! │  └────────┬────────┘   └────────┬────────┘                       │
//! └───────────┼─────────────────────┼────────────────────────────────┘
//!             │ admit / deduct / return (one call per stream)
//!             ▼                     ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │               Controller (per store, shared)                     │
//! │        TokenBucket per stream: regular + elastic pools           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kvflow_core::{LogPosition, RangeId, StoreId, Stream, Tokens, WorkPriority};
//! use kvflow_handle::{
//!     BucketController, FlowControlConfig, Handle, HandleMetrics, MonotonicClock,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let controller = Arc::new(BucketController::new(FlowControlConfig::default()).unwrap());
//! let handle = Handle::new(
//!     RangeId::new(1),
//!     controller,
//!     Arc::new(HandleMetrics::new()),
//!     Arc::new(MonotonicClock::new()),
//! );
//!
//! let follower = Stream::for_store(StoreId::new(2));
//! handle.connect_stream(LogPosition::new(1, 10), follower);
//!
//! // Wait for capacity, propose, then deduct at the entry's position.
//! handle.admit(WorkPriority::Normal, 0, &CancellationToken::new()).await.unwrap();
//! handle.deduct_tokens_for(WorkPriority::Normal, LogPosition::new(1, 11), Tokens::new(512));
//!
//! // Once the follower admits the entry, return its tokens.
//! let returned =
//!     handle.return_tokens_upto(WorkPriority::Normal, LogPosition::new(1, 11), follower);
//! assert_eq!(returned, Tokens::new(512));
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod connected_stream;
pub mod controller;
pub mod error;
pub mod flow_handle;
pub mod handle;
pub mod metrics;
pub mod token_bucket;
pub mod tracker;

// Re-export main types for convenience.
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{FlowControlConfig, FlowControlMode};
pub use connected_stream::ConnectedStream;
pub use controller::{BucketController, Controller, NonBlockingController};
pub use error::{FlowError, FlowResult};
pub use flow_handle::FlowHandle;
pub use handle::{Handle, HandleSnapshot, NonBlockingAdmit, StreamSnapshot};
pub use metrics::{ClassMetricsSnapshot, HandleMetrics};
pub use token_bucket::TokenBucket;
pub use tracker::Tracker;
