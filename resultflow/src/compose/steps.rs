//! Explicit step sequences and their drivers.
//!
//! A [`StepSequence`] is a resumable state machine that yields one step
//! result at a time. [`drive`] feeds each successful value back in and stops
//! at the first error, giving the sequence one chance to release what it
//! holds through [`StepSequence::terminate`].

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, trace, warn};

use crate::errors::{raise_on_panic, raise_on_panic_async, reraise, Panic};

/// One transition of a step sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<Y, C> {
    /// An intermediate step; the driver inspects it before resuming.
    Yield(Y),
    /// The sequence ran to completion and produced its final result.
    Complete(C),
}

/// A resumable sequence of fallible steps.
pub trait StepSequence {
    /// Value produced by a successful step and sent back on resume.
    type Value;
    /// Final value of a completed sequence.
    type Output;
    /// Error shared by every step.
    type Error;

    /// Advances to the next step. `sent` carries the previous step's value
    /// and is `None` on the first call.
    fn resume(
        &mut self,
        sent: Option<Self::Value>,
    ) -> Step<Result<Self::Value, Self::Error>, Result<Self::Output, Self::Error>>;

    /// Called exactly once when the driver abandons the sequence after a
    /// step error.
    fn terminate(&mut self) {}
}

/// Runs a [`StepSequence`] to its result.
///
/// Panics inside the sequence are raised as [`Panic`].
pub fn drive<S: StepSequence>(mut sequence: S) -> Result<S::Output, S::Error> {
    let mut sent = None;
    let mut index = 0usize;

    loop {
        let step = raise_on_panic("Step sequence panicked", || sequence.resume(sent.take()));
        match step {
            Step::Yield(Ok(value)) => {
                trace!(step = index, "Step succeeded");
                index += 1;
                sent = Some(value);
            }
            Step::Yield(Err(err)) => {
                debug!(step = index, "Short-circuiting on step error");
                raise_on_panic("Cleanup panicked while short-circuiting", || {
                    sequence.terminate();
                });
                return Err(err);
            }
            Step::Complete(result) => {
                trace!(steps = index, "Step sequence completed");
                return result;
            }
        }
    }
}

/// A step sequence whose steps are futures.
pub trait AsyncStepSequence {
    /// Value produced by a successful step and sent back on resume.
    type Value;
    /// Final value of a completed sequence.
    type Output;
    /// Error shared by every step.
    type Error;
    /// A pending step.
    type Pending: Future<Output = Result<Self::Value, Self::Error>>;

    /// Advances to the next step.
    fn resume(
        &mut self,
        sent: Option<Self::Value>,
    ) -> Step<Self::Pending, Result<Self::Output, Self::Error>>;

    /// Called exactly once when the driver abandons the sequence after a
    /// step error. The returned future is awaited to completion.
    fn terminate(&mut self) -> BoxFuture<'_, ()> {
        async {}.boxed()
    }
}

/// Runs an [`AsyncStepSequence`], awaiting each step before resuming.
pub async fn drive_async<S: AsyncStepSequence>(mut sequence: S) -> Result<S::Output, S::Error> {
    let mut sent = None;
    let mut index = 0usize;

    loop {
        let step = raise_on_panic("Step sequence panicked", || sequence.resume(sent.take()));
        let pending = match step {
            Step::Yield(pending) => pending,
            Step::Complete(result) => {
                trace!(steps = index, "Step sequence completed");
                return result;
            }
        };

        match raise_on_panic_async("Step sequence panicked", pending).await {
            Ok(value) => {
                trace!(step = index, "Step succeeded");
                index += 1;
                sent = Some(value);
            }
            Err(err) => {
                debug!(step = index, "Short-circuiting on step error");
                raise_on_panic_async("Cleanup panicked while short-circuiting", sequence.terminate())
                    .await;
                return Err(err);
            }
        }
    }
}

type StepFn<'a, S, E> = Box<dyn FnOnce(&mut S) -> Result<(), E> + 'a>;
type CleanupFn<'a, S> = Box<dyn FnOnce(&mut S) + 'a>;

enum Instruction<'a, S, E> {
    Step(String, StepFn<'a, S, E>),
    Cleanup(String, CleanupFn<'a, S>),
}

/// An instruction list over a piece of state.
///
/// Steps run in order against `&mut S`. A cleanup is armed only once the
/// run reaches it, so it pairs naturally with the step that acquired the
/// resource it releases. Armed cleanups run in LIFO order, exactly once,
/// before [`Steps::finish`] produces the result.
///
/// ```rust
/// use resultflow::compose::Steps;
///
/// let total = Steps::new(Vec::new())
///     .step("load", |rows: &mut Vec<i32>| {
///         rows.extend([1, 2, 3]);
///         Ok::<_, String>(())
///     })
///     .cleanup("release", |rows| rows.shrink_to_fit())
///     .finish(|rows| Ok(rows.iter().sum::<i32>()));
///
/// assert_eq!(total, Ok(6));
/// ```
pub struct Steps<'a, S, E> {
    state: S,
    instructions: Vec<Instruction<'a, S, E>>,
}

impl<'a, S, E> Steps<'a, S, E> {
    /// Starts a list over `state`.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state,
            instructions: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step<F>(mut self, name: &str, run: F) -> Self
    where
        F: FnOnce(&mut S) -> Result<(), E> + 'a,
    {
        self.instructions
            .push(Instruction::Step(name.to_string(), Box::new(run)));
        self
    }

    /// Appends a cleanup, armed when the run reaches this point.
    #[must_use]
    pub fn cleanup<F>(mut self, name: &str, run: F) -> Self
    where
        F: FnOnce(&mut S) + 'a,
    {
        self.instructions
            .push(Instruction::Cleanup(name.to_string(), Box::new(run)));
        self
    }

    /// Number of queued instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Runs every instruction and hands the state to `finisher`.
    pub fn finish<T, F>(self, finisher: F) -> Result<T, E>
    where
        F: FnOnce(S) -> Result<T, E> + 'a,
    {
        drive(StepRunner {
            state: Some(self.state),
            pending: self.instructions.into_iter(),
            armed: Vec::new(),
            finisher: Some(Box::new(finisher)),
        })
    }
}

impl<S, E> std::fmt::Debug for Steps<'_, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Steps")
            .field("pending_count", &self.instructions.len())
            .finish_non_exhaustive()
    }
}

struct StepRunner<'a, S, E, T> {
    state: Option<S>,
    pending: std::vec::IntoIter<Instruction<'a, S, E>>,
    armed: Vec<(String, CleanupFn<'a, S>)>,
    finisher: Option<Box<dyn FnOnce(S) -> Result<T, E> + 'a>>,
}

impl<S, E, T> StepRunner<'_, S, E, T> {
    /// Runs armed cleanups LIFO; returns the first failure.
    fn run_cleanups(&mut self) -> Option<(String, Panic)> {
        let state = self.state.as_mut()?;
        let mut first = None;

        while let Some((name, cleanup)) = self.armed.pop() {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| cleanup(&mut *state)));
            if let Err(payload) = outcome {
                let panic = Panic::from_payload("Cleanup action panicked", payload);
                warn!(cleanup = %name, cause = ?panic.cause, "Cleanup action panicked");
                if first.is_none() {
                    first = Some((name, panic));
                }
            }
        }

        first
    }

    fn raise_cleanup_failure(context: &str, name: &str, panic: Panic) -> ! {
        let cause = panic.cause.unwrap_or(panic.message);
        Panic::new(format!("{context}: {name}")).with_cause(cause).raise()
    }
}

impl<S, E, T> StepSequence for StepRunner<'_, S, E, T> {
    type Value = ();
    type Output = T;
    type Error = E;

    fn resume(&mut self, _sent: Option<()>) -> Step<Result<(), E>, Result<T, E>> {
        while let Some(instruction) = self.pending.next() {
            match instruction {
                Instruction::Cleanup(name, run) => self.armed.push((name, run)),
                Instruction::Step(name, run) => {
                    let Some(state) = self.state.as_mut() else {
                        Panic::new("Step state already consumed").raise();
                    };
                    trace!(step = %name, "Running step");
                    match std::panic::catch_unwind(AssertUnwindSafe(|| run(state))) {
                        Ok(result) => return Step::Yield(result),
                        Err(payload) => {
                            // The step's defect outranks any cleanup defect.
                            self.run_cleanups();
                            reraise("Step panicked", payload);
                        }
                    }
                }
            }
        }

        if let Some((name, panic)) = self.run_cleanups() {
            Self::raise_cleanup_failure("Cleanup panicked", &name, panic);
        }
        match (self.state.take(), self.finisher.take()) {
            (Some(state), Some(finisher)) => Step::Complete(finisher(state)),
            _ => Panic::new("Step sequence resumed after completion").raise(),
        }
    }

    fn terminate(&mut self) {
        if let Some((name, panic)) = self.run_cleanups() {
            Self::raise_cleanup_failure("Cleanup panicked while short-circuiting", &name, panic);
        }
    }
}
