//! Mock operations and probes for testing combinators.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a [`FlakyOperation`] while it is still failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("flaky failure on call {call}")]
pub struct FlakyError {
    /// 1-based number of the failing call.
    pub call: u32,
}

/// An operation that fails a fixed number of times, then succeeds.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct FlakyOperation<T> {
    failures: u32,
    value: T,
    calls: Arc<AtomicU32>,
}

impl<T: Clone> FlakyOperation<T> {
    /// Creates an operation that fails `failures` times before returning
    /// `value`.
    #[must_use]
    pub fn new(failures: u32, value: T) -> Self {
        Self {
            failures,
            value,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Invokes the operation once.
    pub fn call(&self) -> Result<T, FlakyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(FlakyError { call })
        } else {
            Ok(self.value.clone())
        }
    }

    /// Async flavor of [`FlakyOperation::call`]; yields once before
    /// answering.
    pub async fn call_async(&self) -> Result<T, FlakyError> {
        tokio::task::yield_now().await;
        self.call()
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ProbeCounters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

/// Tracks how many tasks run at the same time.
///
/// Each task holds a [`ProbeGuard`] while it runs. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    counters: Arc<ProbeCounters>,
}

impl ConcurrencyProbe {
    /// Creates a probe with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a task as started. Dropping the guard marks it finished.
    #[must_use]
    pub fn enter(&self) -> ProbeGuard {
        let counters = &self.counters;
        counters.started.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            counters: Arc::clone(counters),
        }
    }

    /// Tasks currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks seen running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Tasks started so far.
    #[must_use]
    pub fn started(&self) -> usize {
        self.counters.started.load(Ordering::SeqCst)
    }

    /// Tasks finished or dropped so far.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }
}

/// Held by a running task; see [`ConcurrencyProbe::enter`].
#[derive(Debug)]
pub struct ProbeGuard {
    counters: Arc<ProbeCounters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Ordered record of events, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if `entry` was recorded.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().iter().any(|e| e == entry)
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flaky_operation_recovers() {
        let op = FlakyOperation::new(2, "ok");

        assert_eq!(op.call(), Err(FlakyError { call: 1 }));
        assert_eq!(op.clone().call(), Err(FlakyError { call: 2 }));
        assert_eq!(op.call(), Ok("ok"));
        assert_eq!(op.calls(), 3);
    }

    #[test]
    fn test_probe_tracks_peak() {
        let probe = ConcurrencyProbe::new();
        let a = probe.enter();
        let b = probe.enter();
        drop(a);
        let c = probe.enter();

        assert_eq!(probe.in_flight(), 2);
        assert_eq!(probe.max_in_flight(), 2);
        drop((b, c));
        assert_eq!(probe.in_flight(), 0);
        assert_eq!(probe.started(), 3);
        assert_eq!(probe.finished(), 3);
    }

    #[test]
    fn test_call_log() {
        let log = CallLog::new();
        log.clone().record("a");
        log.record(String::from("b"));

        assert_eq!(log.entries(), vec!["a", "b"]);
        assert!(log.contains("b"));
        log.clear();
        assert_eq!(log.count(), 0);
    }
}
