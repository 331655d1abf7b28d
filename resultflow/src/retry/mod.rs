//! Fallible-call wrappers with bounded retry and backoff.
//!
//! This module provides:
//! - `attempt` / `attempt_async` for one-shot wrapping
//! - `Attempt` / `AsyncAttempt` builders with error mapping and retry
//! - `RetryConfig` / `RetryPolicy` with backoff and jitter strategies

mod attempt;
mod policy;

pub use attempt::{
    attempt, attempt_async, AsyncAttempt, Attempt, ErrorMapper, MapWith, Unhandled,
};
pub use policy::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryPolicy, RetryPredicate,
    RetryState,
};
