//! Fallible-call wrappers: turn an operation that may fail into a typed
//! `Result`, optionally retrying with backoff.

use std::future::Future;

use super::{RetryDecision, RetryPolicy, RetryState};
use crate::errors::{raise_on_panic, raise_on_panic_async, UnhandledException};

/// Maps a raw failure returned by an operation into a domain error.
pub trait ErrorMapper<X> {
    /// The domain error type.
    type Error;

    /// Performs the mapping.
    fn map_error(&self, failure: X) -> Self::Error;
}

/// Default mapper: wraps the failure in an [`UnhandledException`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Unhandled;

impl<X> ErrorMapper<X> for Unhandled
where
    X: Into<anyhow::Error>,
{
    type Error = UnhandledException;

    fn map_error(&self, failure: X) -> UnhandledException {
        UnhandledException::new(failure)
    }
}

/// Adapter that turns a closure into an [`ErrorMapper`].
#[derive(Debug, Clone, Copy)]
pub struct MapWith<G>(pub G);

impl<X, E, G> ErrorMapper<X> for MapWith<G>
where
    G: Fn(X) -> E,
{
    type Error = E;

    fn map_error(&self, failure: X) -> E {
        (self.0)(failure)
    }
}

/// Wraps `operation` once, with the default mapper and no retry.
pub fn attempt<T, X, F>(operation: F) -> Result<T, UnhandledException>
where
    F: FnOnce() -> Result<T, X>,
    X: Into<anyhow::Error>,
{
    raise_on_panic("Operation panicked", operation).map_err(UnhandledException::new)
}

/// Async counterpart of [`attempt`].
pub async fn attempt_async<T, X, F, Fut>(operation: F) -> Result<T, UnhandledException>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, X>>,
    X: Into<anyhow::Error>,
{
    raise_on_panic_async("Operation panicked", async move { operation().await })
        .await
        .map_err(UnhandledException::new)
}

/// Synchronous wrapper with optional error mapping and retry.
///
/// Retries run back to back: a synchronous call cannot suspend, so the
/// policy's delays only apply to [`AsyncAttempt`].
///
/// ```rust
/// use resultflow::retry::{Attempt, RetryPolicy};
///
/// # fn main() -> Result<(), resultflow::ContractViolation> {
/// let mut calls = 0;
/// let result = Attempt::mapped(
///     || {
///         calls += 1;
///         if calls < 3 { Err(calls) } else { Ok("ready") }
///     },
///     |n: u32| format!("failed on call {n}"),
/// )
/// .retry(RetryPolicy::attempts(3)?)
/// .run();
///
/// assert_eq!(result, Ok("ready"));
/// # Ok(())
/// # }
/// ```
pub struct Attempt<F, M = Unhandled, E = UnhandledException> {
    operation: F,
    mapper: M,
    policy: Option<RetryPolicy<E>>,
}

impl<F> Attempt<F> {
    /// Wraps an operation with the default mapper.
    pub fn new(operation: F) -> Self {
        Self {
            operation,
            mapper: Unhandled,
            policy: None,
        }
    }
}

impl<F, G, E> Attempt<F, MapWith<G>, E> {
    /// Wraps an operation whose failures are mapped by `mapper`.
    pub fn mapped<T, X>(operation: F, mapper: G) -> Self
    where
        F: FnMut() -> Result<T, X>,
        G: Fn(X) -> E,
    {
        Self {
            operation,
            mapper: MapWith(mapper),
            policy: None,
        }
    }
}

impl<F, M, E> Attempt<F, M, E> {
    /// Enables retrying with `policy`.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Runs the operation until it succeeds or the policy gives up.
    ///
    /// Returns the first `Ok`, or the mapped error of the final attempt.
    pub fn run<T, X>(mut self) -> Result<T, E>
    where
        F: FnMut() -> Result<T, X>,
        M: ErrorMapper<X, Error = E>,
    {
        let mut state = RetryState::new();

        loop {
            let attempt = state.begin_attempt();
            let failure = match raise_on_panic("Operation panicked", &mut self.operation) {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let mapper = &self.mapper;
            let error = raise_on_panic("Error mapper panicked", || mapper.map_error(failure));

            let Some(policy) = &self.policy else {
                return Err(error);
            };
            match state.decide(policy, &error) {
                RetryDecision::Retry(_) => {
                    tracing::debug!(attempt, "Retrying after error");
                }
                RetryDecision::GiveUp => {
                    if attempt > 1 {
                        tracing::warn!(attempts = state.attempt(), "Retry attempts exhausted");
                    }
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    tracing::debug!(attempt, "Error rejected by retry predicate");
                    return Err(error);
                }
            }
        }
    }
}

/// Asynchronous wrapper with optional error mapping and retry.
///
/// Between attempts it waits for the policy's backoff delay; the next
/// attempt never starts before the delay has fully elapsed.
pub struct AsyncAttempt<F, M = Unhandled, E = UnhandledException> {
    operation: F,
    mapper: M,
    policy: Option<RetryPolicy<E>>,
}

impl<F> AsyncAttempt<F> {
    /// Wraps an operation with the default mapper.
    pub fn new(operation: F) -> Self {
        Self {
            operation,
            mapper: Unhandled,
            policy: None,
        }
    }
}

impl<F, G, E> AsyncAttempt<F, MapWith<G>, E> {
    /// Wraps an operation whose failures are mapped by `mapper`.
    pub fn mapped<T, X, Fut>(operation: F, mapper: G) -> Self
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, X>>,
        G: Fn(X) -> E,
    {
        Self {
            operation,
            mapper: MapWith(mapper),
            policy: None,
        }
    }
}

impl<F, M, E> AsyncAttempt<F, M, E> {
    /// Enables retrying with `policy`.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Runs the operation until it succeeds or the policy gives up.
    pub async fn run<T, X, Fut>(mut self) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, X>>,
        M: ErrorMapper<X, Error = E>,
    {
        let mut state = RetryState::new();

        loop {
            let attempt = state.begin_attempt();
            let operation = &mut self.operation;
            let outcome =
                raise_on_panic_async("Operation panicked", async { operation().await }).await;
            let failure = match outcome {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let mapper = &self.mapper;
            let error = raise_on_panic("Error mapper panicked", || mapper.map_error(failure));

            let Some(policy) = &self.policy else {
                return Err(error);
            };
            match state.decide(policy, &error) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    if attempt > 1 {
                        tracing::warn!(attempts = state.attempt(), "Retry attempts exhausted");
                    }
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    tracing::debug!(attempt, "Error rejected by retry predicate");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Panic;
    use crate::retry::{BackoffStrategy, RetryConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum FetchError {
        Transient(u32),
        Fatal,
    }

    #[test]
    fn test_attempt_success() {
        let result = attempt(|| Ok::<_, std::io::Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_attempt_wraps_failure() {
        let result: Result<i32, _> = attempt(|| Err(anyhow::anyhow!("connection reset")));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Unhandled exception: connection reset");
    }

    #[test]
    fn test_attempt_operation_panic_is_a_defect() {
        let result = Panic::catch(|| attempt(|| -> Result<i32, std::io::Error> { panic!("bug") }));
        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Operation panicked");
        assert_eq!(panic.cause.as_deref(), Some("bug"));
    }

    #[test]
    fn test_no_retry_without_policy() {
        let mut calls = 0;
        let result = Attempt::mapped(
            || {
                calls += 1;
                Err::<i32, _>(calls)
            },
            FetchError::Transient,
        )
        .run();

        assert_eq!(result, Err(FetchError::Transient(1)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_success_does_not_consume_retries() {
        let mut calls = 0;
        let result = Attempt::new(|| {
            calls += 1;
            Ok::<_, std::io::Error>("done")
        })
        .retry(RetryPolicy::attempts(5).unwrap())
        .run();

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_until_success() {
        let mut calls = 0;
        let result = Attempt::mapped(
            || {
                calls += 1;
                if calls < 3 {
                    Err(calls)
                } else {
                    Ok(calls * 10)
                }
            },
            FetchError::Transient,
        )
        .retry(RetryPolicy::attempts(3).unwrap())
        .run();

        assert_eq!(result, Ok(30));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let mut calls = 0;
        let result: Result<(), _> = Attempt::mapped(
            || {
                calls += 1;
                Err(calls)
            },
            FetchError::Transient,
        )
        .retry(RetryPolicy::attempts(4).unwrap())
        .run();

        assert_eq!(result, Err(FetchError::Transient(4)));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_should_retry_false_stops_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = Attempt::mapped(
            || {
                calls += 1;
                Err(calls)
            },
            |n| if n == 2 { FetchError::Fatal } else { FetchError::Transient(n) },
        )
        .retry(
            RetryPolicy::attempts(10).unwrap()
                .with_should_retry(|err: &FetchError, _| *err != FetchError::Fatal),
        )
        .run();

        assert_eq!(result, Err(FetchError::Fatal));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_should_retry_sees_attempt_number() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = seen.clone();
        let _ = Attempt::mapped(|| Err::<(), _>(()), |()| "nope")
            .retry(RetryPolicy::attempts(3).unwrap().with_should_retry(move |_, attempt| {
                record.lock().push(attempt);
                true
            }))
            .run();

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_mapper_panic_is_not_retried() {
        let mut calls = 0;
        let result = Panic::catch(|| {
            Attempt::mapped(
                || {
                    calls += 1;
                    Err::<(), _>(())
                },
                |()| -> FetchError { panic!("mapper bug") },
            )
            .retry(RetryPolicy::attempts(3).unwrap())
            .run()
        });

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Error mapper panicked");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_attempt_async_wraps_failure() {
        let result: Result<(), _> =
            attempt_async(|| async { Err(std::io::Error::other("timeout")) }).await;
        assert_eq!(result.unwrap_err().to_string(), "Unhandled exception: timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_exponential_backoff_waits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();

        let result = AsyncAttempt::mapped(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(n)
                    } else {
                        Ok("payload")
                    }
                }
            },
            FetchError::Transient,
        )
        .retry(RetryPolicy::new(
            RetryConfig::new()
                .with_attempts(3)
                .with_delay_ms(10)
                .with_backoff(BackoffStrategy::Exponential),
        )
        .unwrap())
        .run()
        .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_constant_backoff_delay_precedes_next_attempt() {
        let starts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = starts.clone();
        let origin = Instant::now();

        let result: Result<(), _> = AsyncAttempt::mapped(
            move || {
                log.lock().push(origin.elapsed());
                async { Err(()) }
            },
            |()| FetchError::Fatal,
        )
        .retry(RetryPolicy::new(RetryConfig::new().with_attempts(3).with_delay_ms(25)).unwrap())
        .run()
        .await;

        assert_eq!(result, Err(FetchError::Fatal));
        let starts = starts.lock().clone();
        assert_eq!(starts.len(), 3);
        assert!(starts[1] - starts[0] >= Duration::from_millis(25));
        assert!(starts[2] - starts[1] >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_async_operation_panic_is_a_defect() {
        let result = Panic::catch_async(
            AsyncAttempt::new(|| async {
                tokio::task::yield_now().await;
                if true {
                    panic!("async bug");
                }
                Ok::<(), std::io::Error>(())
            })
            .retry(RetryPolicy::attempts(3).unwrap())
            .run(),
        )
        .await;

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Operation panicked");
        assert_eq!(panic.cause.as_deref(), Some("async bug"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_should_retry_false_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = AsyncAttempt::mapped(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(n) }
            },
            |n| if n == 2 { FetchError::Fatal } else { FetchError::Transient(n) },
        )
        .retry(
            RetryPolicy::new(RetryConfig::new().with_attempts(10).with_delay_ms(5))
                .unwrap()
                .with_should_retry(|err: &FetchError, _| *err != FetchError::Fatal),
        )
        .run()
        .await;

        assert_eq!(result, Err(FetchError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_async_mapper_panic_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = Panic::catch_async(
            AsyncAttempt::mapped(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(()) }
                },
                |()| -> FetchError { panic!("mapper bug") },
            )
            .retry(RetryPolicy::attempts(3).unwrap())
            .run(),
        )
        .await;

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Error mapper panicked");
        assert_eq!(panic.cause.as_deref(), Some("mapper bug"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
