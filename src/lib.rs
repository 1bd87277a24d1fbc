//! # cotest
//!
//! A harness for running coroutine-style test bodies against a
//! single-threaded, callback-driven event loop, with per-test wall-clock
//! timeouts and a loop guard that makes any callback error fatal instead of
//! logged-and-ignored.
//!
//! ## Features
//!
//! - **TestLoop**: an explicit per-test event loop (FIFO callbacks plus
//!   deadline-ordered timers) whose fail-fast guard surfaces the first
//!   callback error at the `run` call site
//! - **CoroutineDriver**: steps a suspended test body across its suspension
//!   points, one outstanding operation at a time
//! - **TimeoutGuard**: a per-test deadline, floored by a process-wide
//!   minimum, racing the driver through a one-shot outcome cell
//! - **Asserting operations**: `assert_raises` and `assert_equal` wrappers
//!   that validate an operation's outcome before the body sees it
//!
//! ## Quick Start
//!
//! ```rust
//! use cotest::prelude::*;
//! use std::time::{Duration, Instant};
//!
//! let mut phase = 0;
//! let result = TestHarness::new("test_echo")
//!     .timeout(Duration::from_secs(1))
//!     .run(move |input: Resumption<String>| {
//!         phase += 1;
//!         match (phase, input) {
//!             (1, Resumption::Start) => {
//!                 let op = AsyncOperation::call(|ev, complete| {
//!                     let at = Instant::now() + Duration::from_millis(5);
//!                     ev.add_timeout(at, move |ev| {
//!                         complete(ev, Completion::resolved(Some("hello".to_string())))
//!                     });
//!                 });
//!                 Step::Suspended(assert_equal("hello".to_string(), op))
//!             }
//!             (2, Resumption::Resolved(_)) => Step::Completed,
//!             _ => Step::Failed(HarnessError::assertion("unexpected step")),
//!         }
//!     });
//! assert!(result.is_ok());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod driver;
pub mod error;
pub mod event_loop;
pub mod harness;
pub mod operation;
pub mod timeout;

/// Convenient re-exports for common functionality
pub mod prelude {
    pub use crate::driver::{CoroutineDriver, DriverState, Resumption, Step, Suspendable};
    pub use crate::error::{ErrorKind, HarnessError, IncompleteCause, OperationError, Result};
    pub use crate::event_loop::{LoopGuard, TestLoop, TimerHandle};
    pub use crate::harness::{TestHarness, DEFAULT_TIMEOUT};
    pub use crate::operation::{
        assert_equal, assert_raises, AsyncOperation, Completion, CompletionFn, Delivery,
    };
    pub use crate::timeout::{
        effective_timeout, set_timeout_floor, timeout_floor, OutcomeCell, TimeoutGuard,
    };
}

// Re-export the prelude at crate root for convenience
pub use prelude::*;
