//! Task inputs for the aggregator.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::task::JoinHandle;

use super::Concurrency;
use crate::errors::{reraise, Panic};

/// The tasks of one aggregate call, resolved once when the call starts.
pub enum TaskSet<Fut, F> {
    /// Futures handed over as-is. All of them are polled from the start, so
    /// they always run unbounded.
    Eager(Vec<Fut>),
    /// Factories invoked at scheduling time, honoring the concurrency cap.
    Lazy {
        /// One factory per task, in output order.
        factories: Vec<F>,
        /// In-flight cap.
        concurrency: Concurrency,
    },
}

impl<Fut> TaskSet<Fut, fn() -> Fut> {
    /// Wraps a list of futures.
    pub fn eager(futures: impl IntoIterator<Item = Fut>) -> Self {
        Self::Eager(futures.into_iter().collect())
    }
}

impl<Fut, F> TaskSet<Fut, F> {
    /// Wraps a list of factories.
    pub fn lazy(factories: impl IntoIterator<Item = F>, concurrency: Concurrency) -> Self {
        Self::Lazy {
            factories: factories.into_iter().collect(),
            concurrency,
        }
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Eager(futures) => futures.len(),
            Self::Lazy { factories, .. } => factories.len(),
        }
    }

    /// Returns true if there are no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The effective cap.
    #[must_use]
    pub fn concurrency(&self) -> Concurrency {
        match self {
            Self::Eager(_) => Concurrency::Unbounded,
            Self::Lazy { concurrency, .. } => *concurrency,
        }
    }
}

impl<Fut, F> std::fmt::Debug for TaskSet<Fut, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Eager(_) => "eager",
            Self::Lazy { .. } => "lazy",
        };
        f.debug_struct("TaskSet")
            .field("kind", &kind)
            .field("len", &self.len())
            .field("concurrency", &self.concurrency())
            .finish()
    }
}

/// A tokio task viewed as an aggregate input.
///
/// Dropping it detaches the task: work that was already started keeps
/// running and its result is discarded. A panic inside the task is raised
/// as a [`Panic`] when the result is awaited.
pub struct SpawnedTask<T, E> {
    handle: JoinHandle<Result<T, E>>,
    _result: PhantomData<fn() -> (T, E)>,
}

impl<T, E> SpawnedTask<T, E> {
    /// Adapts an existing handle.
    #[must_use]
    pub fn new(handle: JoinHandle<Result<T, E>>) -> Self {
        Self {
            handle,
            _result: PhantomData,
        }
    }

    /// Returns true once the task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T, E> SpawnedTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawns `future` on the current tokio runtime.
    pub fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(tokio::spawn(future))
    }
}

impl<T, E> Future for SpawnedTask<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.handle).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(err) if err.is_panic() => reraise("Spawned task panicked", err.into_panic()),
            Err(err) => Panic::new("Spawned task was cancelled")
                .with_cause(err.to_string())
                .raise(),
        }
    }
}

impl<T, E> std::fmt::Debug for SpawnedTask<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedTask")
            .field("finished", &self.is_finished())
            .finish()
    }
}
