//! Concurrency-bounded aggregation of Result-producing tasks.
//!
//! This module provides:
//! - [`aggregate`]: the single scheduling entry point over a [`TaskSet`]
//! - [`all`], [`all_settled`], [`all_lazy`], [`all_settled_lazy`]: typed
//!   shorthands for the common shapes
//! - [`Mode`], [`Concurrency`] and the serde-loadable [`AggregateConfig`]
//! - [`SpawnedTask`]: a tokio task adapter whose work outlives an early
//!   conclusion

mod options;
mod scheduler;
mod task;

pub use options::{AggregateConfig, Concurrency, Mode};
pub use scheduler::{
    aggregate, aggregate_with, all, all_lazy, all_settled, all_settled_lazy, Aggregate,
};
pub use task::{SpawnedTask, TaskSet};
