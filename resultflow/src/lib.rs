//! # Resultflow
//!
//! Typed failure propagation for sync and async Rust code.
//!
//! Resultflow builds on `std::result::Result` and adds:
//!
//! - **Retry wrapper**: run a fallible operation with a bounded retry
//!   policy, mapping its failure into a typed domain error
//! - **Composition**: straight-line or state-machine step sequences that
//!   short-circuit on the first error and run cleanups exactly once
//! - **Aggregation**: await many tasks in fail-fast or settled mode, with
//!   an optional cap on how many run at once
//!
//! Expected failures travel in the `Err` channel. Bugs surface as a
//! [`Panic`], which unwinds instead of masquerading as a domain error.
//!
//! ## Quick Start
//!
//! ```rust
//! use resultflow::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fetch = |id: u32| async move {
//!     if id == 0 { Err(format!("no record {id}")) } else { Ok(id * 10) }
//! };
//!
//! let totals = compose_async(|scope| async move {
//!     let first = scope.wait(fetch(1)).await?;
//!     let rest = scope.wait(all(vec![fetch(2), fetch(3)])).await?;
//!     Ok::<_, String>(first + rest.iter().sum::<u32>())
//! })
//! .await;
//!
//! assert_eq!(totals, Ok(60));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod compose;
pub mod errors;
pub mod observability;
pub mod result;
pub mod retry;
pub mod testing;


pub use errors::{ContractViolation, Panic, ResultflowError, UnhandledException};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{
        aggregate, all, all_lazy, all_settled, all_settled_lazy, Aggregate, AggregateConfig,
        Concurrency, Mode, SpawnedTask, TaskSet,
    };
    pub use crate::compose::{
        compose, compose_async, drive, drive_async, AsyncScope, AsyncStepSequence, Scope, Step,
        StepSequence, Steps,
    };
    pub use crate::errors::{ContractViolation, Panic, ResultflowError, UnhandledException};
    pub use crate::result::{Kind, ResultKind, ResultRecord};
    pub use crate::retry::{
        attempt, attempt_async, AsyncAttempt, Attempt, BackoffStrategy, JitterStrategy,
        MapWith, RetryConfig, RetryPolicy,
    };
}
