//! Asynchronous operations and asserting wrappers
//!
//! An [`AsyncOperation`] describes one callback-style call against the
//! primitive under test: a dispatch closure that starts the call, and a
//! check stage applied to the raw completion before anything reaches the
//! test body. Plain operations use the identity check; [`assert_raises`]
//! and [`assert_equal`] compose a verdict on top, so the driver treats all
//! operations uniformly.

use std::fmt::Debug;

use crate::error::{ErrorKind, HarnessError, OperationError, Result};
use crate::event_loop::TestLoop;

/// The (value, error) pair reported by a completion callback
///
/// Exactly one side is populated; the constructors enforce it. A completion
/// is recorded exactly once per operation (the callback is `FnOnce`) and
/// consumed exactly once when the driver resumes the body.
#[derive(Debug)]
pub struct Completion<V> {
    value: Option<V>,
    error: Option<OperationError>,
}

impl<V> Completion<V> {
    /// A completion carrying a resolved value (possibly none)
    pub fn resolved(value: Option<V>) -> Self {
        Self { value, error: None }
    }

    /// A completion carrying an operation error
    pub fn raised(error: OperationError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    /// The resolved value, if any
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// The error, if any
    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<V>, Option<OperationError>) {
        (self.value, self.error)
    }
}

/// What a check stage decides to do with a completion
pub enum Delivery<V> {
    /// Hand the completion to the test body at its suspension point
    Resume(Completion<V>),
    /// Bypass the body and fail the test directly
    Abort(HarnessError),
}

/// Completion callback handed to an operation's dispatch closure
///
/// Must be invoked at most once, with either a value or an error.
pub type CompletionFn<V> = Box<dyn FnOnce(&mut TestLoop, Completion<V>) -> Result<()> + 'static>;

type CallFn<V> = Box<dyn FnOnce(&mut TestLoop, CompletionFn<V>) + 'static>;
type CheckFn<V> = Box<dyn FnOnce(Completion<V>) -> Delivery<V> + 'static>;

/// A callback-style asynchronous call plus its pre-delivery check
///
/// Transient: created, dispatched once by the driver, completed, discarded.
/// At most one operation is outstanding per driver at any instant.
pub struct AsyncOperation<V> {
    call: CallFn<V>,
    check: CheckFn<V>,
}

impl<V: 'static> AsyncOperation<V> {
    /// Describe a call against the primitive under test
    ///
    /// The closure receives the event loop and a completion callback; it
    /// must arrange (typically via loop callbacks or timers) for the
    /// completion to be invoked at most once.
    pub fn call(call: impl FnOnce(&mut TestLoop, CompletionFn<V>) + 'static) -> Self {
        Self {
            call: Box::new(call),
            check: Box::new(Delivery::Resume),
        }
    }

    /// Replace the check stage, keeping the underlying call
    fn with_check(self, check: impl FnOnce(Completion<V>) -> Delivery<V> + 'static) -> Self {
        // Run the operation's own check first so wrappers stack.
        let inner = self.check;
        Self {
            call: self.call,
            check: Box::new(move |completion| match inner(completion) {
                Delivery::Resume(c) => check(c),
                abort @ Delivery::Abort(_) => abort,
            }),
        }
    }

    pub(crate) fn into_parts(self) -> (CallFn<V>, CheckFn<V>) {
        (self.call, self.check)
    }
}

/// Expect `op` to fail with an error of `kind`
///
/// On resolution: no error means the test fails with "not raised"; an error
/// of the wrong kind fails with "raised instead of"; an error of the
/// expected kind is consumed and the call's value (usually none) is resumed
/// into the body.
pub fn assert_raises<V: 'static>(kind: ErrorKind, op: AsyncOperation<V>) -> AsyncOperation<V> {
    op.with_check(move |completion| {
        let (value, error) = completion.into_parts();
        match error {
            Some(err) if err.kind() == kind => Delivery::Resume(Completion {
                value,
                error: None,
            }),
            Some(err) => Delivery::Abort(HarnessError::assertion(format!(
                "{err} raised instead of {kind}"
            ))),
            None => Delivery::Abort(HarnessError::assertion(format!("{kind} not raised"))),
        }
    })
}

/// Expect `op` to resolve with a value equal to `expected`
///
/// A real operation error is re-delivered unchanged rather than being
/// masked as a comparison mismatch. An unequal value fails with both values
/// in the message; an equal value is resumed into the body.
pub fn assert_equal<V>(expected: V, op: AsyncOperation<V>) -> AsyncOperation<V>
where
    V: PartialEq + Debug + 'static,
{
    op.with_check(move |completion| {
        let (value, error) = completion.into_parts();
        if let Some(err) = error {
            return Delivery::Abort(HarnessError::Operation(err));
        }
        match value {
            Some(v) if v == expected => Delivery::Resume(Completion::resolved(Some(v))),
            Some(v) => Delivery::Abort(HarnessError::assertion(format!(
                "operation returned {v:?}, not {expected:?}"
            ))),
            None => Delivery::Abort(HarnessError::assertion(format!(
                "operation returned no value, expected {expected:?}"
            ))),
        }
    })
}
