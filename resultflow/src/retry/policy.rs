//! Retry configuration with configurable backoff and jitter strategies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{raise_on_panic, ContractViolation, ResultflowError};

/// Backoff strategy for retry delays.
///
/// For the n-th retry (n starting at 1):
/// - `Constant`: delay = base
/// - `Linear`: delay = base * n
/// - `Exponential`: delay = base * 2^(n-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    #[default]
    Constant,
    /// Delay grows by `base` each retry.
    Linear,
    /// Delay doubles each retry.
    Exponential,
}

impl BackoffStrategy {
    /// Calculates the delay in milliseconds before retry number `retry`.
    #[must_use]
    pub fn delay_ms(self, base_ms: u64, retry: u32) -> u64 {
        let retry = retry.max(1);
        match self {
            Self::Constant => base_ms,
            Self::Linear => base_ms.saturating_mul(u64::from(retry)),
            Self::Exponential => base_ms.saturating_mul(2u64.saturating_pow(retry - 1)),
        }
    }
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay in milliseconds.
    #[must_use]
    pub fn apply(self, delay_ms: u64) -> u64 {
        match self {
            Self::None => delay_ms,
            Self::Full => {
                if delay_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay_ms)
                }
            }
            Self::Equal => {
                let half = delay_ms / 2;
                if half == 0 {
                    delay_ms
                } else {
                    half + rand::thread_rng().gen_range(0..=delay_ms - half)
                }
            }
        }
    }
}

/// Serializable part of a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of tries, including the first one. Must be at least 1.
    pub attempts: u32,
    /// Base delay between tries in milliseconds.
    pub delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
    /// Optional cap on a single delay, applied before jitter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay_ms: 0,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
            max_delay_ms: None,
        }
    }
}

impl RetryConfig {
    /// Creates a config that tries exactly once.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of tries.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay_ms(mut self, delay: u64) -> Self {
        self.delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Caps every single delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Checks the config for contract violations.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.attempts == 0 {
            return Err(ContractViolation::new("retry attempts must be >= 1"));
        }
        Ok(())
    }

    /// Calculates the wait before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay = self.backoff.delay_ms(self.delay_ms, retry);
        let capped = self.max_delay_ms.map_or(delay, |max| delay.min(max));
        Duration::from_millis(self.jitter.apply(capped))
    }

    /// Parses and validates a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ResultflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Predicate deciding whether a failed attempt may be retried.
///
/// Receives the mapped domain error and the 1-based number of the attempt
/// that produced it.
pub type RetryPredicate<E> = Arc<dyn Fn(&E, u32) -> bool + Send + Sync>;

/// A [`RetryConfig`] plus an optional `should_retry` predicate.
///
/// Owned by the call site and handed to the wrapper by value.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    should_retry: Option<RetryPredicate<E>>,
}

impl<E> RetryPolicy<E> {
    /// Creates a policy from a config; every error is retryable.
    ///
    /// Fails with a [`ContractViolation`] when `config.attempts` is zero.
    pub fn new(config: RetryConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self {
            config,
            should_retry: None,
        })
    }

    /// Shorthand for a policy with `attempts` tries and no delay.
    pub fn attempts(attempts: u32) -> Result<Self, ContractViolation> {
        Self::new(RetryConfig::new().with_attempts(attempts))
    }

    /// Sets the retry predicate.
    #[must_use]
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Returns the serializable config.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Asks the predicate whether `error` from attempt `attempt` may be
    /// retried. A panicking predicate is a defect.
    pub fn allows(&self, error: &E, attempt: u32) -> bool {
        self.should_retry.as_ref().map_or(true, |predicate| {
            raise_on_panic("Retry predicate panicked", || predicate(error, attempt))
        })
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
            should_retry: None,
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: self.should_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("has_should_retry", &self.should_retry.is_some())
            .finish()
    }
}

impl<E> TryFrom<RetryConfig> for RetryPolicy<E> {
    type Error = ContractViolation;

    fn try_from(config: RetryConfig) -> Result<Self, ContractViolation> {
        Self::new(config)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the predicate rejected the error.
    NotRetryable,
}

/// Attempt counter for one wrapped call.
#[derive(Debug, Default)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Returns true if no attempts remain.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.attempts
    }

    /// Decides what to do after the current attempt failed with `error`.
    #[must_use]
    pub fn decide<E>(&self, policy: &RetryPolicy<E>, error: &E) -> RetryDecision {
        if self.is_exhausted(policy.config()) {
            return RetryDecision::GiveUp;
        }
        if !policy.allows(error, self.attempt) {
            return RetryDecision::NotRetryable;
        }
        RetryDecision::Retry(policy.config().delay_for_retry(self.attempt))
    }
}
