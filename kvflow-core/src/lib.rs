//! kvflow Core - Strongly-typed values shared by the flow control crates.
//!
//! This crate provides the vocabulary of replication flow control: which
//! stream traffic is headed to, what log position it occupies, how important
//! it is, and how many tokens it costs. It does NOT provide any accounting;
//! that lives in `kvflow-handle`.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up `StoreId` with `RangeId`
//! - **Explicit limits**: Token pools have a bounded size
//! - **Explicit types**: Use u64/i8, not usize
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod position;
mod priority;
mod tokens;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use position::LogPosition;
pub use priority::{WorkClass, WorkPriority};
pub use tokens::Tokens;
pub use types::{RangeId, StoreId, Stream, TenantId};
