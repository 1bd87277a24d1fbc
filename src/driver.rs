//! Stepping suspended test bodies across their suspension points
//!
//! A test body is a [`Suspendable`] computation: each resumption either
//! yields the next [`AsyncOperation`], completes, or fails. The
//! [`CoroutineDriver`] owns the body for the test's duration, dispatches
//! each yielded operation, and resumes the body with that operation's
//! outcome. Exactly one operation is outstanding at any instant; operation
//! N+1 is never dispatched before N's completion has fired and the body has
//! been resumed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{HarnessError, OperationError, Result};
use crate::event_loop::{TestLoop, TimerHandle};
use crate::operation::{AsyncOperation, Completion, CompletionFn, Delivery};
use crate::timeout::{Decision, OutcomeCell};

/// Input fed into a test body when it is resumed
#[derive(Debug)]
pub enum Resumption<V> {
    /// The priming step; no operation has completed yet
    Start,
    /// The outstanding operation resolved with a value (possibly none)
    Resolved(Option<V>),
    /// The outstanding operation failed; the body may handle the error or
    /// propagate it as a step failure
    Raised(OperationError),
}

impl<V> Resumption<V> {
    fn from_completion(completion: Completion<V>) -> Self {
        // Contract: value and error are never both present.
        let (value, error) = completion.into_parts();
        match error {
            Some(err) => Resumption::Raised(err),
            None => Resumption::Resolved(value),
        }
    }
}

/// The explicit tagged result of one driver step
pub enum Step<V> {
    /// The body yielded an operation and is suspended awaiting its outcome
    Suspended(AsyncOperation<V>),
    /// The body completed normally
    Completed,
    /// The body raised an error
    Failed(HarnessError),
}

/// A resumable test-body computation
///
/// Implemented for any `FnMut(Resumption<V>) -> Step<V>` closure, so a body
/// is typically a closure over its own phase counter and captured probes.
/// Returning this type is the static contract replacing any runtime "is
/// this a suspending computation?" inspection.
pub trait Suspendable<V> {
    /// Advance to the next suspension point or terminal state
    fn resume(&mut self, input: Resumption<V>) -> Step<V>;
}

impl<V, F> Suspendable<V> for F
where
    F: FnMut(Resumption<V>) -> Step<V>,
{
    fn resume(&mut self, input: Resumption<V>) -> Step<V> {
        self(input)
    }
}

/// Driver lifecycle; forward-only, terminal at Finished/Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Stepping the body
    Running,
    /// The body completed normally
    Finished,
    /// The body or an assertion wrapper failed
    Failed,
}

/// Steps a suspended test body through successive async operations
///
/// Shared (via `Rc<RefCell>`) between the harness, each operation's
/// completion callback, and nothing else. On reaching a terminal state the
/// body is dropped and the armed deadline disarmed, exactly once.
pub struct CoroutineDriver<V> {
    body: Option<Box<dyn Suspendable<V>>>,
    state: DriverState,
    /// Key of the outstanding operation; completions with any other key are
    /// stale and discarded.
    current_key: u64,
    outstanding: bool,
    outcome: Rc<OutcomeCell>,
    deadline: Option<TimerHandle>,
    test: String,
}

impl<V: 'static> CoroutineDriver<V> {
    /// Bind a driver to a body, the shared outcome cell, and the armed
    /// deadline
    pub fn new(
        body: Box<dyn Suspendable<V>>,
        outcome: Rc<OutcomeCell>,
        deadline: TimerHandle,
        test: &str,
    ) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            body: Some(body),
            state: DriverState::Running,
            current_key: 0,
            outstanding: false,
            outcome,
            deadline: Some(deadline),
            test: test.to_string(),
        }))
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Perform the one synchronous priming step
    ///
    /// Runs before the loop starts, so a body that fails before its first
    /// suspension surfaces here rather than inside the loop.
    pub fn prime(this: &Rc<RefCell<Self>>, ev: &mut TestLoop) -> Result<()> {
        Self::advance(this, ev, Resumption::Start)
    }

    /// Whether a completion keyed `key` is still current
    fn accepts(&self, key: u64) -> bool {
        self.state == DriverState::Running
            && self.outstanding
            && self.current_key == key
            && !self.outcome.is_decided()
    }

    fn advance(this: &Rc<RefCell<Self>>, ev: &mut TestLoop, input: Resumption<V>) -> Result<()> {
        let step = {
            let mut driver = this.borrow_mut();
            debug_assert_eq!(driver.state, DriverState::Running);
            driver.outstanding = false;
            match driver.body.as_mut() {
                Some(body) => body.resume(input),
                // Terminal states drop the body; advance is unreachable then.
                None => {
                    return Err(HarnessError::configuration(
                        "driver resumed after reaching a terminal state",
                    ))
                }
            }
        };

        match step {
            Step::Suspended(op) => {
                let key = {
                    let mut driver = this.borrow_mut();
                    driver.current_key += 1;
                    driver.outstanding = true;
                    driver.current_key
                };
                let (call, check) = op.into_parts();
                let driver = Rc::clone(this);
                let complete: CompletionFn<V> = Box::new(move |ev, completion| {
                    if !driver.borrow().accepts(key) {
                        log::debug!("discarding stale completion for operation {key}");
                        return Ok(());
                    }
                    match check(completion) {
                        Delivery::Resume(c) => {
                            Self::advance(&driver, ev, Resumption::from_completion(c))
                        }
                        Delivery::Abort(err) => {
                            Self::terminate(&driver, ev, DriverState::Failed);
                            Err(err)
                        }
                    }
                });
                log::debug!("dispatching operation {key}");
                call(ev, complete);
                Ok(())
            }
            Step::Completed => {
                log::debug!("test body finished");
                Self::terminate(this, ev, DriverState::Finished);
                Ok(())
            }
            Step::Failed(err) => {
                log::debug!("test body failed: {err}");
                Self::terminate(this, ev, DriverState::Failed);
                Err(err)
            }
        }
    }

    /// Move to a terminal state: drop the body, disarm the deadline, and
    /// stop the loop if this path won the outcome race.
    fn terminate(this: &Rc<RefCell<Self>>, ev: &mut TestLoop, state: DriverState) {
        let decision = match state {
            DriverState::Finished => Decision::Finished,
            _ => Decision::Failed,
        };
        let mut driver = this.borrow_mut();
        driver.state = state;
        driver.body = None;
        driver.outstanding = false;
        if let Some(handle) = driver.deadline.take() {
            ev.remove_timeout(handle);
        }
        if driver.outcome.try_decide(decision) {
            ev.stop();
        } else {
            log::debug!(
                "outcome for '{}' already decided; leaving the loop alone",
                driver.test
            );
        }
    }
}
