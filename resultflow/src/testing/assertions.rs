//! Test assertions for results and defects.

use std::fmt::Debug;

use crate::errors::Panic;
use crate::result::{Kind, ResultKind};

/// Asserts that the result is `Ok` and returns the value.
#[track_caller]
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("Expected Ok, got Err({err:?})"),
    }
}

/// Asserts that the result is `Err` and returns the error.
#[track_caller]
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok({value:?})"),
        Err(err) => err,
    }
}

/// Asserts that the result has the expected discriminator.
#[track_caller]
pub fn assert_kind<T: Debug, E: Debug>(result: &Result<T, E>, expected: Kind) {
    assert_eq!(
        result.kind(),
        expected,
        "Expected {expected} result, got {result:?}"
    );
}

/// Runs `f` and asserts that it raised a [`Panic`] whose message starts
/// with `prefix`. Returns the panic for further inspection.
#[track_caller]
pub fn assert_panics_with<R: Debug>(prefix: &str, f: impl FnOnce() -> R) -> Panic {
    match Panic::catch(f) {
        Ok(value) => panic!("Expected a Panic starting with '{prefix}', got {value:?}"),
        Err(panic) => {
            assert!(
                panic.message.starts_with(prefix),
                "Expected a Panic starting with '{}', got '{}'",
                prefix,
                panic.message
            );
            panic
        }
    }
}
