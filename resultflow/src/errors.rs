//! Error types for the resultflow crate.
//!
//! Failures fall into two classes:
//!
//! - **domain errors** are expected and typed. They travel in the error
//!   channel of a `Result` and callers branch on them.
//! - **defects** are bugs. They surface as a [`Panic`], which unwinds out of
//!   the combinator that detected it and is never coerced into a domain error.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use thiserror::Error;

/// The main error type for resultflow configuration and plumbing.
#[derive(Debug, Error)]
pub enum ResultflowError {
    /// A caller broke an API contract.
    #[error("{0}")]
    Contract(#[from] ContractViolation),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or conflicting configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ResultflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised when a caller violates the documented contract of an operation,
/// e.g. a concurrency limit of zero or a retry policy with no attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Contract violation: {message}")]
pub struct ContractViolation {
    /// What was violated.
    pub message: String,
}

impl ContractViolation {
    /// Creates a new contract violation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Default domain error for a wrapped operation that failed and had no
/// error mapper. The original failure is kept as the cause.
pub struct UnhandledException {
    cause: anyhow::Error,
}

impl UnhandledException {
    /// Wraps a failure.
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// Returns the original failure.
    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Consumes the error and returns the original failure.
    #[must_use]
    pub fn into_cause(self) -> anyhow::Error {
        self.cause
    }
}

impl fmt::Debug for UnhandledException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnhandledException")
            .field("cause", &self.cause.to_string())
            .finish()
    }
}

impl fmt::Display for UnhandledException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unhandled exception: {}", self.cause)
    }
}

impl std::error::Error for UnhandledException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

/// A defect: a panic raised where a `Result` was expected, or a second
/// panic raised while cleaning up after a short-circuit.
///
/// A `Panic` always terminates the current composition or wrapper call.
/// It is raised by unwinding with the `Panic` itself as the payload, so an
/// enclosing combinator re-raises it unchanged instead of wrapping it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Panic {
    /// What the engine was doing when the defect surfaced.
    pub message: String,
    /// Rendered panic payload of the original defect, if any.
    pub cause: Option<String>,
}

impl Panic {
    /// Creates a new panic with no cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Sets the cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Classifies an unwind payload.
    ///
    /// A payload that is already a `Panic` is returned unchanged.
    #[must_use]
    pub fn from_payload(message: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<Self>() {
            Ok(panic) => *panic,
            Err(payload) => Self::new(message).with_cause(describe_payload(payload.as_ref())),
        }
    }

    /// Logs the defect and unwinds with `self` as the payload.
    pub fn raise(self) -> ! {
        tracing::error!(
            message = %self.message,
            cause = ?self.cause,
            "Panic raised"
        );
        std::panic::resume_unwind(Box::new(self))
    }

    /// Runs `f`, converting any unwind into a `Panic`.
    pub fn catch<F, R>(f: F) -> Result<R, Self>
    where
        F: FnOnce() -> R,
    {
        std::panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| Self::from_payload("Unexpected panic", payload))
    }

    /// Awaits `future`, converting any unwind into a `Panic`.
    pub async fn catch_async<Fut>(future: Fut) -> Result<Fut::Output, Self>
    where
        Fut: Future,
    {
        AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .map_err(|payload| Self::from_payload("Unexpected panic", payload))
    }
}

/// Runs `f`; an unwind out of it is classified as a `Panic` described by
/// `what` and raised again. An unwind that already carries a `Panic` is
/// resumed untouched.
pub(crate) fn raise_on_panic<R>(what: &str, f: impl FnOnce() -> R) -> R {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => reraise(what, payload),
    }
}

/// Async counterpart of [`raise_on_panic`].
pub(crate) async fn raise_on_panic_async<Fut>(what: &str, future: Fut) -> Fut::Output
where
    Fut: Future,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => reraise(what, payload),
    }
}

pub(crate) fn reraise(what: &str, payload: Box<dyn Any + Send>) -> ! {
    match payload.downcast::<Panic>() {
        Ok(panic) => std::panic::resume_unwind(panic),
        Err(payload) => Panic::from_payload(what, payload).raise(),
    }
}

/// Renders a panic payload for logs and `Panic::cause`.
pub(crate) fn describe_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(panic) = payload.downcast_ref::<Panic>() {
        panic.to_string()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
