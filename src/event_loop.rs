//! Single-threaded callback event loop with a guarded exception policy
//!
//! The loop owns a FIFO queue of immediate callbacks and a deadline-ordered
//! set of timers, and runs them on the calling thread until it is stopped or
//! runs out of work. Callbacks report failure by returning an error; what
//! happens next is decided by the loop's [`LoopGuard`].
//!
//! The default guard mirrors the usual event-loop posture of logging a
//! callback failure and carrying on. The harness installs the fail-fast
//! guard instead, which captures the first error, stops the loop, and hands
//! the error back from [`TestLoop::run`] so nothing is silently swallowed.

use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::Instant;

use crate::error::{HarnessError, Result};

/// A callback scheduled on the loop
///
/// Callbacks receive the loop itself so they can schedule further work or
/// stop the run.
pub type LoopCallback = Box<dyn FnOnce(&mut TestLoop) -> Result<()> + 'static>;

/// Handle identifying a scheduled timer, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    deadline: Instant,
    seq: u64,
}

/// How the loop reacts to an error returned from a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPolicy {
    /// Log the error and keep dispatching (the policy the guard replaces)
    LogAndContinue,
    /// Capture the error, stop the loop, and return it from `run`
    FailFast,
}

/// The loop's callback-error policy and captured fault
///
/// With the fail-fast policy, one callback error terminates the whole run
/// immediately and re-surfaces at the `run` call site. There is no partial
/// continuation.
#[derive(Debug)]
pub struct LoopGuard {
    policy: ErrorPolicy,
    fault: Option<HarnessError>,
}

impl LoopGuard {
    fn log_and_continue() -> Self {
        Self {
            policy: ErrorPolicy::LogAndContinue,
            fault: None,
        }
    }

    fn fail_fast() -> Self {
        Self {
            policy: ErrorPolicy::FailFast,
            fault: None,
        }
    }

    /// Record a callback error. Returns true if the loop must stop.
    fn observe(&mut self, err: HarnessError) -> bool {
        match self.policy {
            ErrorPolicy::LogAndContinue => {
                log::error!("callback error (continuing): {err}");
                false
            }
            ErrorPolicy::FailFast => {
                log::error!("callback error (stopping loop): {err}");
                // Keep the first fault; later ones cannot occur because the
                // loop stops before dispatching anything else.
                if self.fault.is_none() {
                    self.fault = Some(err);
                }
                true
            }
        }
    }

    fn take_fault(&mut self) -> Option<HarnessError> {
        self.fault.take()
    }
}

/// A single-threaded, callback-driven event loop
///
/// One instance exists per test invocation; construction is installation and
/// drop is teardown. Immediate callbacks run in FIFO order; timers run in
/// deadline order, ties broken by scheduling order. The loop is not
/// reentrant and must not be shared across tests.
pub struct TestLoop {
    queue: VecDeque<LoopCallback>,
    timers: BTreeMap<TimerHandle, LoopCallback>,
    timer_seq: u64,
    stop_requested: bool,
    guard: LoopGuard,
}

impl TestLoop {
    /// Create a loop with the default log-and-continue error policy
    pub fn new() -> Self {
        Self::with_guard(LoopGuard::log_and_continue())
    }

    /// Create a loop whose guard makes any callback error fatal to the run
    pub fn guarded() -> Self {
        Self::with_guard(LoopGuard::fail_fast())
    }

    fn with_guard(guard: LoopGuard) -> Self {
        Self {
            queue: VecDeque::new(),
            timers: BTreeMap::new(),
            timer_seq: 0,
            stop_requested: false,
            guard,
        }
    }

    /// Schedule a callback to run on the next loop iteration
    pub fn add_callback(&mut self, cb: impl FnOnce(&mut TestLoop) -> Result<()> + 'static) {
        self.queue.push_back(Box::new(cb));
    }

    /// Schedule a callback to run at `deadline`
    pub fn add_timeout(
        &mut self,
        deadline: Instant,
        cb: impl FnOnce(&mut TestLoop) -> Result<()> + 'static,
    ) -> TimerHandle {
        self.timer_seq += 1;
        let handle = TimerHandle {
            deadline,
            seq: self.timer_seq,
        };
        self.timers.insert(handle, Box::new(cb));
        handle
    }

    /// Cancel a scheduled timer. Returns false if it already fired or was
    /// already removed.
    pub fn remove_timeout(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    /// Request that the loop stop before dispatching anything else
    ///
    /// Idempotent. Work still queued when the loop exits is dropped with it,
    /// so a stopped run can never dispatch a stale callback.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Whether `stop` has been requested on this loop
    pub fn was_stopped(&self) -> bool {
        self.stop_requested
    }

    /// Run until stopped or out of work
    ///
    /// Returns the first callback error when the fail-fast guard is
    /// installed; otherwise errors are logged and `Ok(())` is returned.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.stop_requested {
                break;
            }

            if let Some(cb) = self.queue.pop_front() {
                self.dispatch(cb);
                continue;
            }

            // No immediate callbacks: wait for the earliest timer, if any.
            let next = match self.timers.first_key_value() {
                Some((handle, _)) => *handle,
                None => break,
            };
            let now = Instant::now();
            if next.deadline > now {
                thread::sleep(next.deadline - now);
            }
            if let Some(cb) = self.timers.remove(&next) {
                self.dispatch(cb);
            }
        }

        match self.guard.take_fault() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, cb: LoopCallback) {
        if let Err(err) = cb(self) {
            if self.guard.observe(err) {
                self.stop_requested = true;
            }
        }
    }
}

impl Default for TestLoop {
    fn default() -> Self {
        Self::new()
    }
}
