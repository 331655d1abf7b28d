//! Composition scopes: the step binder and cleanup registration handed to a
//! composition body.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

use super::CleanupStack;
use crate::errors::{reraise, Panic};

/// Lifecycle of one composition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Steps are being bound.
    Running,
    /// A step produced an error; no further step may run.
    ShortCircuiting,
    /// Registered cleanups are executing.
    CleaningUp,
    /// The aggregate result has been produced.
    Done,
}

#[derive(Debug)]
struct ScopeState {
    phase: Phase,
    steps: usize,
    short_circuit_at: Option<usize>,
}

/// State shared by the sync and async scope front-ends.
#[derive(Debug)]
struct ScopeCore {
    state: Mutex<ScopeState>,
    cleanups: CleanupStack,
}

impl ScopeCore {
    fn new() -> Self {
        Self {
            state: Mutex::new(ScopeState {
                phase: Phase::Running,
                steps: 0,
                short_circuit_at: None,
            }),
            cleanups: CleanupStack::new(),
        }
    }

    fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    fn ensure_running(&self) {
        let phase = self.phase();
        if phase != Phase::Running {
            Panic::new(format!("Step bound after the composition stopped running ({phase:?})"))
                .raise();
        }
    }

    fn record<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        self.ensure_running();
        let mut state = self.state.lock();
        let index = state.steps;
        state.steps += 1;

        if result.is_ok() {
            trace!(step = index, "Step succeeded");
        } else {
            state.phase = Phase::ShortCircuiting;
            state.short_circuit_at = Some(index);
            debug!(step = index, "Short-circuiting on step error");
        }
        result
    }

    /// Moves to `CleaningUp` and reports where the body short-circuited.
    fn begin_cleanup(&self) -> Option<usize> {
        let mut state = self.state.lock();
        state.phase = Phase::CleaningUp;
        state.short_circuit_at
    }

    /// Produces the aggregate result once cleanups have run.
    fn conclude<T, E>(
        &self,
        outcome: std::thread::Result<Result<T, E>>,
        short_circuit_at: Option<usize>,
        failures: Vec<(String, Panic)>,
    ) -> Result<T, E> {
        self.state.lock().phase = Phase::Done;

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => reraise("Composition body panicked", payload),
        };

        if let Some((name, panic)) = failures.into_iter().next() {
            let context = if short_circuit_at.is_some() {
                "Cleanup panicked while short-circuiting"
            } else {
                "Cleanup panicked"
            };
            let cause = panic.cause.unwrap_or(panic.message);
            Panic::new(format!("{context}: {name}")).with_cause(cause).raise();
        }

        match (short_circuit_at, result) {
            (Some(step), Ok(_)) => Panic::new(format!(
                "Composition returned Ok after step {step} short-circuited"
            ))
            .raise(),
            (_, result) => result,
        }
    }
}

/// Handle given to a synchronous composition body.
///
/// `bind` is the unwrap-or-short-circuit step; pair it with `?`.
#[derive(Debug)]
pub struct Scope {
    core: ScopeCore,
}

impl Scope {
    fn new() -> Self {
        Self {
            core: ScopeCore::new(),
        }
    }

    /// Binds one step's result.
    ///
    /// `Ok` passes the value through. `Err` marks the composition as
    /// short-circuited and is handed back for `?` to propagate. Binding
    /// after a short-circuit is a defect.
    pub fn bind<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        self.core.record(result)
    }

    /// Registers a cleanup action that runs exactly once when the body
    /// exits, whatever the exit path.
    pub fn defer<F>(&self, name: &str, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.cleanups.push(Some(name), action);
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Number of steps bound so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.core.state.lock().steps
    }
}

/// Runs a synchronous composition.
///
/// The body is straight-line code whose steps go through [`Scope::bind`].
/// The first `Err` short-circuits, the registered cleanups run in LIFO
/// order, then the error is returned unchanged. A panic in the body or in a
/// cleanup is raised as a [`Panic`] after all cleanups have run.
///
/// ```rust
/// use resultflow::compose::compose;
///
/// fn parse(s: &str) -> Result<i32, String> {
///     s.parse().map_err(|_| format!("not a number: {s}"))
/// }
///
/// let sum = compose(|scope| {
///     let a = scope.bind(parse("20"))?;
///     let b = scope.bind(parse("22"))?;
///     Ok::<_, String>(a + b)
/// });
/// assert_eq!(sum, Ok(42));
///
/// let failed = compose(|scope| {
///     let a = scope.bind(parse("x"))?;
///     Ok::<_, String>(a)
/// });
/// assert_eq!(failed, Err("not a number: x".to_string()));
/// ```
pub fn compose<T, E, F>(body: F) -> Result<T, E>
where
    F: FnOnce(&Scope) -> Result<T, E>,
{
    let scope = Scope::new();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(&scope)));

    let short_circuit_at = scope.core.begin_cleanup();
    let failures = scope.core.cleanups.unwind();
    scope.core.conclude(outcome, short_circuit_at, failures)
}

/// Handle given to an asynchronous composition body.
///
/// Cheap to clone; every clone refers to the same composition.
#[derive(Debug, Clone)]
pub struct AsyncScope {
    core: Arc<ScopeCore>,
}

impl AsyncScope {
    fn new() -> Self {
        Self {
            core: Arc::new(ScopeCore::new()),
        }
    }

    /// Binds a ready result; see [`Scope::bind`].
    pub fn bind<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        self.core.record(result)
    }

    /// Suspends the composition until `pending` settles, then binds its
    /// result.
    pub async fn wait<T, E, Fut>(&self, pending: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.core.ensure_running();
        let settled = pending.await;
        self.core.record(settled)
    }

    /// Registers a synchronous cleanup action.
    pub fn defer<F>(&self, name: &str, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.cleanups.push(Some(name), action);
    }

    /// Registers an asynchronous cleanup action. It is awaited to
    /// completion before the next cleanup starts.
    pub fn defer_async<F, Fut>(&self, name: &str, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.core.cleanups.push_async(Some(name), action);
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Number of steps bound so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.core.state.lock().steps
    }
}

/// Runs an asynchronous composition.
///
/// Same contract as [`compose`]; steps awaited through
/// [`AsyncScope::wait`] run strictly one after another.
pub async fn compose_async<T, E, F, Fut>(body: F) -> Result<T, E>
where
    F: FnOnce(AsyncScope) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    use futures::FutureExt;

    let scope = AsyncScope::new();
    let handle = scope.clone();
    let outcome = std::panic::AssertUnwindSafe(async move { body(handle).await })
        .catch_unwind()
        .await;

    let short_circuit_at = scope.core.begin_cleanup();
    let failures = scope.core.cleanups.unwind_async().await;
    scope.core.conclude(outcome, short_circuit_at, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("not found: {0}")]
    struct NotFound(String);

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("denied")]
    struct Denied;

    #[derive(Debug, PartialEq, Eq, Error)]
    enum LookupError {
        #[error(transparent)]
        NotFound(#[from] NotFound),
        #[error(transparent)]
        Denied(#[from] Denied),
    }

    fn find(key: &str) -> Result<u32, NotFound> {
        match key {
            "a" => Ok(1),
            "b" => Ok(2),
            other => Err(NotFound(other.to_string())),
        }
    }

    fn authorize(allowed: bool) -> Result<(), Denied> {
        if allowed {
            Ok(())
        } else {
            Err(Denied)
        }
    }

    #[test]
    fn test_all_steps_ok() {
        let result = compose(|scope| {
            let a = scope.bind(find("a"))?;
            let b = scope.bind(find("b"))?;
            assert_eq!(scope.steps(), 2);
            Ok::<_, NotFound>(a + b)
        });

        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_short_circuit_skips_later_steps() {
        let effects = AtomicUsize::new(0);
        let result = compose(|scope| {
            scope.bind(find("a"))?;
            effects.fetch_add(1, Ordering::SeqCst);
            scope.bind(find("zzz"))?;
            effects.fetch_add(1, Ordering::SeqCst);
            scope.bind(find("b"))?;
            Ok::<_, NotFound>(())
        });

        assert_eq!(result, Err(NotFound("zzz".to_string())));
        assert_eq!(effects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_union_widens_through_question_mark() {
        let run = |allowed: bool, key: &'static str| {
            compose(|scope| -> Result<u32, LookupError> {
                scope.bind(authorize(allowed))?;
                let value = scope.bind(find(key))?;
                Ok(value)
            })
        };

        assert_eq!(run(true, "b"), Ok(2));
        assert_eq!(run(false, "b"), Err(LookupError::Denied(Denied)));
        assert_eq!(
            run(true, "q"),
            Err(LookupError::NotFound(NotFound("q".to_string())))
        );
    }

    #[test]
    fn test_infallible_composition() {
        let result: Result<&str, Infallible> = compose(|scope| {
            let v = scope.bind(Ok::<_, Infallible>("fine"))?;
            Ok(v)
        });
        assert_eq!(result, Ok("fine"));
    }

    #[test]
    fn test_cleanup_runs_once_on_success() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let c = cleaned.clone();
        let result = compose(|scope| {
            scope.defer("release", move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            scope.bind(find("a"))
        });

        assert_eq!(result, Ok(1));
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_runs_once_on_short_circuit() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let c = cleaned.clone();
        let result = compose(|scope| {
            scope.defer("release", move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            scope.bind(find("missing"))?;
            Ok::<_, NotFound>(())
        });

        assert_eq!(result, Err(NotFound("missing".to_string())));
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanups_run_lifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        let _ = compose(|scope| {
            scope.defer("outer", move || o1.lock().push("outer"));
            scope.defer("inner", move || o2.lock().push("inner"));
            Ok::<_, Infallible>(())
        });

        assert_eq!(*order.lock(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_body_panic_becomes_panic_after_cleanup() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let c = cleaned.clone();
        let result = Panic::catch(|| {
            compose(|scope| -> Result<(), NotFound> {
                scope.defer("release", move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
                panic!("invariant broken");
            })
        });

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Composition body panicked");
        assert_eq!(panic.cause.as_deref(), Some("invariant broken"));
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_panic_during_short_circuit() {
        let result = Panic::catch(|| {
            compose(|scope| {
                scope.defer("close", || panic!("close failed"));
                scope.bind(find("nope"))?;
                Ok::<_, NotFound>(())
            })
        });

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Cleanup panicked while short-circuiting: close");
        assert_eq!(panic.cause.as_deref(), Some("close failed"));
    }

    #[test]
    fn test_cleanup_panic_on_success_is_a_defect() {
        let result = Panic::catch(|| {
            compose(|scope| {
                scope.defer("close", || panic!("close failed"));
                scope.bind(find("a"))
            })
        });

        assert_eq!(result.unwrap_err().message, "Cleanup panicked: close");
    }

    #[test]
    fn test_bind_after_short_circuit_is_a_defect() {
        let result = Panic::catch(|| {
            compose(|scope| {
                let _ignored = scope.bind(find("nope"));
                scope.bind(find("a"))
            })
        });

        let panic = result.unwrap_err();
        assert!(panic.message.starts_with("Step bound after the composition stopped running"));
    }

    #[test]
    fn test_swallowed_error_cannot_turn_into_ok() {
        let result = Panic::catch(|| {
            compose(|scope| {
                let _ignored = scope.bind(find("nope"));
                Ok::<_, NotFound>(0)
            })
        });

        assert_eq!(
            result.unwrap_err().message,
            "Composition returned Ok after step 0 short-circuited"
        );
    }

    #[test]
    fn test_explicit_error_return_without_bind() {
        let result: Result<(), Denied> = compose(|scope| {
            scope.defer("noop", || {});
            Err(Denied)
        });
        assert_eq!(result, Err(Denied));
    }

    #[tokio::test]
    async fn test_async_composition_ok() {
        let result = compose_async(|scope| async move {
            let a = scope.wait(async { find("a") }).await?;
            let b = scope.bind(find("b"))?;
            Ok::<_, NotFound>(a + b)
        })
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_async_short_circuit_runs_async_cleanup() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());

        let result = compose_async(|scope| async move {
            scope.defer("sync", move || o1.lock().push("sync cleanup"));
            scope.defer_async("async", move || async move {
                tokio::task::yield_now().await;
                o2.lock().push("async cleanup");
            });
            scope.wait(async { find("missing") }).await?;
            o3.lock().push("after failure");
            Ok::<_, NotFound>(())
        })
        .await;

        assert_eq!(result, Err(NotFound("missing".to_string())));
        assert_eq!(*order.lock(), vec!["async cleanup", "sync cleanup"]);
    }

    #[tokio::test]
    async fn test_async_steps_are_sequential() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let step = |in_flight: Arc<AtomicUsize>, max_seen: Arc<AtomicUsize>| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, Infallible>(now)
        };

        let (f, m) = (in_flight.clone(), max_seen.clone());
        let result = compose_async(|scope| async move {
            for _ in 0..5 {
                scope.wait(step(f.clone(), m.clone())).await?;
            }
            Ok::<_, Infallible>(scope.steps())
        })
        .await;

        assert_eq!(result, Ok(5));
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_body_panic_becomes_panic() {
        let result = Panic::catch_async(compose_async(|_scope| async move {
            tokio::task::yield_now().await;
            if true {
                panic!("async invariant");
            }
            Ok::<(), Denied>(())
        }))
        .await;

        let panic = result.unwrap_err();
        assert_eq!(panic.message, "Composition body panicked");
        assert_eq!(panic.cause.as_deref(), Some("async invariant"));
    }

    #[tokio::test]
    async fn test_scope_clone_outliving_body_cannot_bind() {
        let leaked = Arc::new(Mutex::new(None));
        let slot = leaked.clone();
        let result = compose_async(|scope| async move {
            *slot.lock() = Some(scope.clone());
            Ok::<_, Infallible>(())
        })
        .await;
        assert_eq!(result, Ok(()));

        let scope = leaked.lock().take().unwrap();
        assert_eq!(scope.phase(), Phase::Done);
        let late = Panic::catch(|| scope.bind(Ok::<_, Infallible>(1)));
        assert!(late.is_err());
    }
}
