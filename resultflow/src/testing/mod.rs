//! Testing utilities for code built on resultflow.
//!
//! This module provides:
//! - Mock operations that fail a set number of times
//! - Probes for concurrency and call ordering
//! - Assertions for results and raised defects

mod assertions;
mod mocks;

pub use assertions::{assert_err, assert_kind, assert_ok, assert_panics_with};
pub use mocks::{CallLog, ConcurrencyProbe, FlakyError, FlakyOperation, ProbeGuard};
