//! LIFO cleanup stack for composition scopes.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::warn;

use crate::errors::Panic;

enum CleanupAction {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>),
}

struct CleanupEntry {
    name: Option<String>,
    action: CleanupAction,
}

impl CleanupEntry {
    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}

/// Cleanup actions executed in LIFO order, each exactly once.
///
/// Running the stack drains it: a second run finds nothing to do. A
/// panicking action does not stop the remaining ones; every failure is
/// reported back to the caller as a [`Panic`].
#[derive(Default)]
pub struct CleanupStack {
    entries: Mutex<Vec<CleanupEntry>>,
}

impl CleanupStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous cleanup action.
    pub fn push<F>(&self, name: Option<&str>, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.entries.lock().push(CleanupEntry {
            name: name.map(String::from),
            action: CleanupAction::Sync(Box::new(action)),
        });
    }

    /// Registers an asynchronous cleanup action.
    pub fn push_async<F, Fut>(&self, name: Option<&str>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.entries.lock().push(CleanupEntry {
            name: name.map(String::from),
            action: CleanupAction::Async(Box::new(move || action().boxed())),
        });
    }

    /// Returns the number of pending cleanup actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Runs every pending action synchronously, last registered first.
    ///
    /// Async actions cannot run here and are reported as failures.
    pub fn unwind(&self) -> Vec<(String, Panic)> {
        let entries = self.drain();
        let mut failures = Vec::new();

        for entry in entries.into_iter().rev() {
            let name = entry.label();
            match entry.action {
                CleanupAction::Sync(action) => {
                    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(action)) {
                        let panic = Panic::from_payload("Cleanup action panicked", payload);
                        warn!(cleanup = %name, cause = ?panic.cause, "Cleanup action panicked");
                        failures.push((name, panic));
                    }
                }
                CleanupAction::Async(_) => {
                    let panic = Panic::new("Async cleanup registered on a synchronous scope");
                    warn!(cleanup = %name, "Async cleanup cannot run synchronously");
                    failures.push((name, panic));
                }
            }
        }

        failures
    }

    /// Runs every pending action, awaiting async ones to completion before
    /// starting the next.
    pub async fn unwind_async(&self) -> Vec<(String, Panic)> {
        let entries = self.drain();
        let mut failures = Vec::new();

        for entry in entries.into_iter().rev() {
            let name = entry.label();
            let outcome = match entry.action {
                CleanupAction::Sync(action) => std::panic::catch_unwind(AssertUnwindSafe(action)),
                CleanupAction::Async(action) => {
                    AssertUnwindSafe(async move { action().await })
                        .catch_unwind()
                        .await
                }
            };
            if let Err(payload) = outcome {
                let panic = Panic::from_payload("Cleanup action panicked", payload);
                warn!(cleanup = %name, cause = ?panic.cause, "Cleanup action panicked");
                failures.push((name, panic));
            }
        }

        failures
    }

    fn drain(&self) -> Vec<CleanupEntry> {
        let mut entries = self.entries.lock();
        std::mem::take(&mut *entries)
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStack")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
