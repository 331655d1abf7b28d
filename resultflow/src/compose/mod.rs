//! Sequential composition of fallible steps.
//!
//! This module provides:
//! - [`compose`] / [`compose_async`]: straight-line bodies whose steps go
//!   through a [`Scope`] and short-circuit with `?`
//! - [`StepSequence`] / [`AsyncStepSequence`] with the [`drive`] and
//!   [`drive_async`] loops for hand-written state machines
//! - [`Steps`]: an instruction list with scoped cleanups
//! - [`CleanupStack`]: the LIFO, exactly-once cleanup registry behind them

mod cleanup;
mod scope;
mod steps;

pub use cleanup::CleanupStack;
pub use scope::{compose, compose_async, AsyncScope, Phase, Scope};
pub use steps::{drive, drive_async, AsyncStepSequence, Step, StepSequence, Steps};
