//! kvflow Tests - integration, property and concurrency tests for kvflow.
//!
//! Unit tests live inline in each crate under `#[cfg(test)]`. This crate
//! exercises flow handles end to end, against a recording controller and
//! against the in-process bucket controller.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `handle_tests`: handle operations through the `FlowHandle` interface
//! - `randomized_tests`: seeded random operation sequences checked against a
//!   reference ledger
//! - `concurrency_tests`: multi-threaded races between admission, deduction,
//!   return, membership changes and close
//! - `bucket_tests`: handles driving real token buckets under back-pressure
//!
//! **Support Modules**:
//! - `recording_controller`: controller test double with per-stream gates
//! - `properties`: property definitions (token conservation, ordering)
//! - `scenarios`: replica layouts, seeds and fixtures
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod recording_controller;
pub mod scenarios;

// Integration test modules.
#[cfg(test)]
mod bucket_tests;

/// Installs a test-friendly tracing subscriber. Honors `RUST_LOG` and
/// defaults to warnings. Safe to call repeatedly.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
