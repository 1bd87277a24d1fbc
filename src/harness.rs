//! End-to-end orchestration of one test invocation
//!
//! [`TestHarness`] is the entry point test authors use: configure a name
//! and timeout, hand it a suspendable body, and get back either `Ok(())`
//! or the single fatal error that ended the run.
//!
//! Per invocation the harness builds a fresh fail-fast [`TestLoop`] (an
//! explicit per-test loop object, never a process-wide singleton), arms the
//! deadline, primes the driver with one synchronous step so pre-suspension
//! failures surface before the loop ever starts, runs the loop, and finally
//! requires the driver to have finished.

use std::rc::Rc;
use std::time::Duration;

use crate::driver::{CoroutineDriver, DriverState, Suspendable};
use crate::error::{HarnessError, IncompleteCause, Result};
use crate::event_loop::TestLoop;
use crate::timeout::{OutcomeCell, TimeoutGuard};

/// Default per-test timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for a single coroutine-style test invocation
///
/// ```
/// use cotest::prelude::*;
///
/// let mut phase = 0;
/// let result = TestHarness::new("doc_test").run(move |input: Resumption<i32>| {
///     phase += 1;
///     match (phase, input) {
///         (1, Resumption::Start) => Step::Suspended(AsyncOperation::call(|ev, complete| {
///             ev.add_callback(move |ev| complete(ev, Completion::resolved(Some(41 + 1))));
///         })),
///         (2, Resumption::Resolved(Some(42))) => Step::Completed,
///         _ => Step::Failed(HarnessError::assertion("unexpected step")),
///     }
/// });
/// assert!(result.is_ok());
/// ```
#[derive(Debug)]
pub struct TestHarness {
    name: String,
    timeout: Duration,
}

impl TestHarness {
    /// Start configuring a test invocation
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the requested timeout
    ///
    /// The armed deadline is `max(timeout, timeout_floor())`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the requested timeout in (possibly fractional) seconds
    ///
    /// Rejects non-finite or negative values with a configuration error.
    pub fn timeout_secs(mut self, secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(HarnessError::configuration(format!(
                "timeout must be a finite, non-negative number of seconds, got {secs}"
            )));
        }
        self.timeout = Duration::from_secs_f64(secs);
        Ok(self)
    }

    /// Run `body` to completion under the configured deadline
    ///
    /// Fatal-error taxonomy: configuration errors surface before anything
    /// runs; body and wrapper failures, unhandled operation errors, and
    /// timeouts surface from the loop; a loop that exits any other way
    /// without the driver finishing is reported as incomplete.
    pub fn run<V, B>(self, body: B) -> Result<()>
    where
        V: 'static,
        B: Suspendable<V> + 'static,
    {
        let mut ev = TestLoop::guarded();
        let outcome = OutcomeCell::new();
        let guard = TimeoutGuard::arm(&mut ev, self.timeout, Rc::clone(&outcome), &self.name);
        log::debug!(
            "running test '{}' with a {:?} deadline",
            self.name,
            guard.effective()
        );

        let driver = CoroutineDriver::new(Box::new(body), outcome, guard.handle(), &self.name);

        // One synchronous step before the loop starts.
        CoroutineDriver::prime(&driver, &mut ev)?;

        ev.run()?;

        if driver.borrow().state() == DriverState::Finished {
            log::debug!("test '{}' finished", self.name);
            return Ok(());
        }

        // The loop returned cleanly without the driver finishing: either
        // something stopped it from under us, or it simply ran dry.
        let cause = if ev.was_stopped() {
            IncompleteCause::Stopped
        } else {
            IncompleteCause::Starved
        };
        Err(HarnessError::Incomplete {
            test: self.name,
            cause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Resumption, Step};
    use crate::operation::{AsyncOperation, Completion};

    #[test]
    fn rejects_non_finite_timeouts() {
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            let err = TestHarness::new("t").timeout_secs(bad).unwrap_err();
            assert!(matches!(err, HarnessError::Configuration { .. }));
        }
    }

    #[test]
    fn accepts_fractional_timeouts() {
        let harness = TestHarness::new("t").timeout_secs(0.25).unwrap();
        assert_eq!(harness.timeout, Duration::from_millis(250));
    }

    #[test]
    fn externally_stopped_loop_is_reported_as_incomplete() {
        let mut phase = 0;
        let result = TestHarness::new("test_rogue_stop").run(move |input: Resumption<()>| {
            phase += 1;
            match (phase, input) {
                (1, Resumption::Start) => {
                    Step::Suspended(AsyncOperation::call(|ev, _complete| {
                        // A body-driven stop, with the completion never fired.
                        ev.add_callback(|ev| {
                            ev.stop();
                            Ok(())
                        });
                    }))
                }
                _ => Step::Failed(HarnessError::assertion("must not be resumed")),
            }
        });
        match result {
            Err(HarnessError::Incomplete { test, cause }) => {
                assert_eq!(test, "test_rogue_stop");
                assert_eq!(cause, IncompleteCause::Stopped);
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn operation_that_schedules_nothing_leaves_only_the_deadline() {
        // With a pending deadline the loop is never starved; the run ends in
        // a timeout rather than an incomplete report.
        let mut phase = 0;
        let result = TestHarness::new("test_never")
            .timeout(Duration::from_millis(5))
            .run(move |input: Resumption<()>| {
                phase += 1;
                match (phase, input) {
                    (1, Resumption::Start) => {
                        Step::Suspended(AsyncOperation::call(|_, _complete| {}))
                    }
                    _ => Step::Failed(HarnessError::assertion("must not be resumed")),
                }
            });
        assert!(matches!(result, Err(HarnessError::Timeout { .. })));
    }

    #[test]
    fn completed_body_returns_ok() {
        let result = TestHarness::new("test_trivial").run(|input: Resumption<()>| match input {
            Resumption::Start => Step::Completed,
            _ => Step::Failed(HarnessError::assertion("unexpected resumption")),
        });
        assert!(result.is_ok());
    }

    #[test]
    fn doc_style_round_trip() {
        let mut phase = 0;
        let result = TestHarness::new("test_roundtrip").run(move |input: Resumption<i32>| {
            phase += 1;
            match (phase, input) {
                (1, Resumption::Start) => Step::Suspended(AsyncOperation::call(|ev, complete| {
                    ev.add_callback(move |ev| complete(ev, Completion::resolved(Some(7))));
                })),
                (2, Resumption::Resolved(Some(7))) => Step::Completed,
                _ => Step::Failed(HarnessError::assertion("unexpected step")),
            }
        });
        assert!(result.is_ok());
    }
}
