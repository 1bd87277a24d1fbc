//! Per-test deadlines, the timeout floor, and outcome arbitration
//!
//! Every test run arms exactly one deadline. The deadline and the driver
//! race to decide the run's outcome through a one-shot [`OutcomeCell`]:
//! whichever writes first stops the loop, and the loser's path is a no-op.
//! A near-simultaneous timeout and completion can therefore never
//! double-stop the loop or double-report a failure.

use std::cell::Cell;
use std::env;
use std::rc::Rc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{HarnessError, Result};
use crate::event_loop::{TestLoop, TimerHandle};

/// Environment variable holding the process-wide minimum timeout, in seconds
pub const TIMEOUT_FLOOR_ENV: &str = "COTEST_TIMEOUT_FLOOR_SECS";

static ENV_FLOOR: Lazy<Duration> = Lazy::new(|| {
    env::var(TIMEOUT_FLOOR_ENV)
        .ok()
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::ZERO)
});

static FLOOR_OVERRIDE: Lazy<RwLock<Option<Duration>>> = Lazy::new(|| RwLock::new(None));

/// The process-wide minimum timeout applied to every test
///
/// Taken from [`TIMEOUT_FLOOR_ENV`] (parsed once), unless overridden via
/// [`set_timeout_floor`].
pub fn timeout_floor() -> Duration {
    FLOOR_OVERRIDE.read().unwrap_or(*ENV_FLOOR)
}

/// Override the timeout floor for this process; `None` restores the
/// environment-derived value
///
/// Intended for tests, which should not mutate process environment.
pub fn set_timeout_floor(floor: Option<Duration>) {
    *FLOOR_OVERRIDE.write() = floor;
}

/// The timeout actually armed for a request: `max(requested, floor)`
///
/// The floor only ever lengthens a timeout; an explicit request above it is
/// unaffected.
pub fn effective_timeout(requested: Duration) -> Duration {
    requested.max(timeout_floor())
}

/// Terminal outcome of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The test body completed normally
    Finished,
    /// The test body or an assertion wrapper failed
    Failed,
    /// The deadline fired first
    TimedOut,
}

/// One-shot, first-writer-wins cell deciding who terminates the run
#[derive(Debug, Default)]
pub struct OutcomeCell {
    decision: Cell<Option<Decision>>,
}

impl OutcomeCell {
    /// Create an undecided cell
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Attempt to decide the outcome. Returns true if this call won; a
    /// losing call must treat its whole path as a no-op.
    pub fn try_decide(&self, decision: Decision) -> bool {
        if self.decision.get().is_some() {
            return false;
        }
        self.decision.set(Some(decision));
        true
    }

    /// The decision, if one has been made
    pub fn decision(&self) -> Option<Decision> {
        self.decision.get()
    }

    /// Whether any path has already terminated the run
    pub fn is_decided(&self) -> bool {
        self.decision.get().is_some()
    }
}

/// The armed per-test deadline
///
/// If the driver has not disarmed it by the deadline, the guard decides
/// `TimedOut`, stops the loop, and fails the run with a timeout naming the
/// test. Disarming is the driver's job, done exactly once on termination.
pub struct TimeoutGuard {
    handle: TimerHandle,
    effective: Duration,
}

impl TimeoutGuard {
    /// Arm the deadline at `now + effective_timeout(requested)`
    pub fn arm(
        ev: &mut TestLoop,
        requested: Duration,
        outcome: Rc<OutcomeCell>,
        test: &str,
    ) -> Self {
        let effective = effective_timeout(requested);
        let test = test.to_string();
        let handle = ev.add_timeout(Instant::now() + effective, move |ev| {
            Self::on_timeout(ev, &outcome, test, effective)
        });
        log::debug!("armed {effective:?} deadline");
        Self { handle, effective }
    }

    fn on_timeout(
        ev: &mut TestLoop,
        outcome: &OutcomeCell,
        test: String,
        limit: Duration,
    ) -> Result<()> {
        // The driver finished in the same instant; it already owns loop
        // termination.
        if !outcome.try_decide(Decision::TimedOut) {
            return Ok(());
        }
        log::error!("test '{test}' timed out after {limit:?}");
        ev.stop();
        Err(HarnessError::Timeout { test, limit })
    }

    /// Handle of the armed timer, held by the driver for disarming
    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    /// The timeout actually armed, after flooring
    pub fn effective(&self) -> Duration {
        self.effective
    }
}
