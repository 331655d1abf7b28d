//! Aggregation modes, concurrency caps and their serde configuration.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::errors::{ContractViolation, ResultflowError};

/// How an aggregate treats task errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Conclude on the first error by settlement order (default).
    #[default]
    FailFast,
    /// Wait for every task and report each outcome.
    Settled,
}

/// Bound on simultaneously in-flight tasks.
///
/// Serialized as the string `"unbounded"` or a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ConcurrencyRepr", into = "ConcurrencyRepr")]
pub enum Concurrency {
    /// Every task runs at once (default).
    #[default]
    Unbounded,
    /// At most this many tasks are in flight.
    Limit(NonZeroUsize),
}

impl Concurrency {
    /// Creates a cap of `n` tasks. Zero is a contract violation.
    pub fn limit(n: usize) -> Result<Self, ContractViolation> {
        NonZeroUsize::new(n)
            .map(Self::Limit)
            .ok_or_else(|| ContractViolation::new("concurrency must be a positive integer"))
    }

    /// Number of tasks started up front for `total` tasks.
    #[must_use]
    pub fn initial_batch(self, total: usize) -> usize {
        match self {
            Self::Unbounded => total,
            Self::Limit(limit) => limit.get().min(total),
        }
    }

    /// Returns true if the cap never throttles `total` tasks.
    #[must_use]
    pub fn is_unbounded_for(self, total: usize) -> bool {
        self.initial_batch(total) == total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ConcurrencyRepr {
    Limit(usize),
    Keyword(String),
}

impl TryFrom<ConcurrencyRepr> for Concurrency {
    type Error = ContractViolation;

    fn try_from(repr: ConcurrencyRepr) -> Result<Self, Self::Error> {
        match repr {
            ConcurrencyRepr::Limit(n) => Self::limit(n),
            ConcurrencyRepr::Keyword(word) if word == "unbounded" => Ok(Self::Unbounded),
            ConcurrencyRepr::Keyword(word) => Err(ContractViolation::new(format!(
                "unknown concurrency '{word}', expected \"unbounded\" or a positive integer"
            ))),
        }
    }
}

impl From<Concurrency> for ConcurrencyRepr {
    fn from(concurrency: Concurrency) -> Self {
        match concurrency {
            Concurrency::Unbounded => Self::Keyword("unbounded".to_string()),
            Concurrency::Limit(limit) => Self::Limit(limit.get()),
        }
    }
}

/// Options for an aggregate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Error handling mode.
    pub mode: Mode,
    /// Concurrency cap; only lazy task sets honor it.
    pub concurrency: Concurrency,
}

impl AggregateConfig {
    /// Creates the default config: fail-fast, unbounded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the concurrency cap.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ResultflowError> {
        Ok(serde_json::from_str(json)?)
    }
}
