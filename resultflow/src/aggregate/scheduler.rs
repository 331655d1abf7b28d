//! Scheduling loop for aggregate calls.
//!
//! Tasks are polled on the caller's task through a [`FuturesUnordered`];
//! nothing is spawned. Results land in a slot per input index so the
//! output order never depends on completion order.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, trace};

use super::{AggregateConfig, Concurrency, Mode, TaskSet};
use crate::errors::{raise_on_panic, reraise};
use crate::observability::SpanTimer;

/// Outcome of an aggregate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate<T, E> {
    /// Fail-fast outcome: every value in input order, or the first error
    /// by settlement order.
    Completed(Result<Vec<T>, E>),
    /// Settled outcome: each task's own result in input order.
    Settled(Vec<Result<T, E>>),
}

impl<T, E> Aggregate<T, E> {
    /// The mode that produced this outcome.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Completed(_) => Mode::FailFast,
            Self::Settled(_) => Mode::Settled,
        }
    }

    /// Collapses the outcome into one result. A settled outcome yields its
    /// first error by input index, if any.
    pub fn into_result(self) -> Result<Vec<T>, E> {
        match self {
            Self::Completed(result) => result,
            Self::Settled(results) => results.into_iter().collect(),
        }
    }

    /// Expands the outcome into per-task results. A fail-fast error becomes
    /// a single-element list since the other outcomes were never observed.
    #[must_use]
    pub fn into_results(self) -> Vec<Result<T, E>> {
        match self {
            Self::Completed(Ok(values)) => values.into_iter().map(Ok).collect(),
            Self::Completed(Err(err)) => vec![Err(err)],
            Self::Settled(results) => results,
        }
    }

    fn empty(mode: Mode) -> Self {
        match mode {
            Mode::FailFast => Self::Completed(Ok(Vec::new())),
            Mode::Settled => Self::Settled(Vec::new()),
        }
    }
}

enum TaskSource<Fut, F> {
    Eager(std::vec::IntoIter<Fut>),
    Lazy(std::vec::IntoIter<F>),
}

impl<Fut, F> TaskSource<Fut, F>
where
    F: FnOnce() -> Fut,
{
    /// Starts the next unscheduled task, if any.
    fn start(&mut self) -> Option<Fut> {
        match self {
            Self::Eager(futures) => futures.next(),
            Self::Lazy(factories) => {
                let factory = factories.next()?;
                Some(raise_on_panic("Task factory panicked", factory))
            }
        }
    }
}

fn track<Fut: Future>(
    index: usize,
    future: Fut,
) -> impl Future<Output = (usize, std::thread::Result<Fut::Output>)> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .map(move |outcome| (index, outcome))
}

/// Runs a task set to its aggregate outcome.
///
/// In [`Mode::FailFast`] the call concludes on the first error by
/// settlement order; futures still pending at that point are dropped
/// without being polled again. Wrap work in a [`super::SpawnedTask`] when it
/// must run to completion regardless. In [`Mode::Settled`] every task is
/// awaited.
///
/// A panic in a task or factory is raised as a [`crate::Panic`].
pub async fn aggregate<T, E, Fut, F>(tasks: TaskSet<Fut, F>, mode: Mode) -> Aggregate<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    F: FnOnce() -> Fut,
{
    let total = tasks.len();
    if total == 0 {
        trace!(?mode, "Empty aggregate");
        return Aggregate::empty(mode);
    }

    let timer = SpanTimer::start("aggregate");
    let concurrency = tasks.concurrency();
    let batch = concurrency.initial_batch(total);
    let throttled = !concurrency.is_unbounded_for(total);
    let mut source = match tasks {
        TaskSet::Eager(futures) => TaskSource::Eager(futures.into_iter()),
        TaskSet::Lazy { factories, .. } => TaskSource::Lazy(factories.into_iter()),
    };

    let mut slots: Vec<Option<Result<T, E>>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut in_flight = FuturesUnordered::new();
    let mut started = 0usize;

    while started < batch {
        let Some(future) = source.start() else { break };
        in_flight.push(track(started, future));
        started += 1;
    }
    debug!(total, started, throttled, ?mode, "Aggregate scheduled");

    let mut settled = 0usize;
    while let Some((index, outcome)) = in_flight.next().await {
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => reraise("Aggregated task panicked", payload),
        };
        settled += 1;
        trace!(index, ok = result.is_ok(), settled, "Task settled");

        if mode == Mode::FailFast {
            if let Err(err) = result {
                debug!(
                    index,
                    settled,
                    started,
                    total,
                    abandoned = in_flight.len(),
                    elapsed_ms = timer.elapsed_ms(),
                    "Aggregate concluded on first error"
                );
                return Aggregate::Completed(Err(err));
            }
        }
        slots[index] = Some(result);

        if let Some(future) = source.start() {
            in_flight.push(track(started, future));
            started += 1;
        }
    }

    debug!(total, ?mode, elapsed_ms = timer.finish(), "Aggregate settled");
    let results = slots.into_iter().flatten();
    match mode {
        Mode::FailFast => Aggregate::Completed(results.collect()),
        Mode::Settled => Aggregate::Settled(results.collect()),
    }
}

/// Fail-fast over futures: every value in input order, or the first error.
///
/// On the first error the remaining futures are dropped, which cancels any
/// work they had started. Pass [`super::SpawnedTask`]s for work that must run
/// to completion.
pub async fn all<I, Fut, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    aggregate(TaskSet::eager(futures), Mode::FailFast)
        .await
        .into_result()
}

/// Settled over futures: each task's result in input order.
pub async fn all_settled<I, Fut, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    aggregate(TaskSet::eager(futures), Mode::Settled)
        .await
        .into_results()
}

/// Fail-fast over factories, starting at most `concurrency` at a time.
///
/// On the first error no further factory is called, and tasks already
/// started are dropped mid-flight. A factory that returns a
/// [`super::SpawnedTask`] keeps its work running instead.
pub async fn all_lazy<I, F, Fut, T, E>(factories: I, concurrency: Concurrency) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    aggregate(TaskSet::lazy(factories, concurrency), Mode::FailFast)
        .await
        .into_result()
}

/// Settled over factories, starting at most `concurrency` at a time.
pub async fn all_settled_lazy<I, F, Fut, T, E>(
    factories: I,
    concurrency: Concurrency,
) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    aggregate(TaskSet::lazy(factories, concurrency), Mode::Settled)
        .await
        .into_results()
}

/// Runs factories with the mode and cap from `config`.
pub async fn aggregate_with<I, F, Fut, T, E>(config: &AggregateConfig, factories: I) -> Aggregate<T, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    aggregate(TaskSet::lazy(factories, config.concurrency), config.mode).await
}
