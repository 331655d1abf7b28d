//! Elapsed-time helper for log fields.

use std::time::{Duration, Instant};

/// Simple span timing helper for log fields.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Finishes the span, logs it at trace level and returns the duration
    /// in milliseconds.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.elapsed_ms();
        tracing::trace!(span = self.name, elapsed_ms, "Span finished");
        elapsed_ms
    }
}
