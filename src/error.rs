//! Error types for the cotest harness
//!
//! Every failure category here is fatal to the single test invocation it
//! occurs in: nothing is retried, and every error surfaces synchronously
//! from [`crate::harness::TestHarness::run`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Broad classification of an [`OperationError`], matched by
/// [`crate::operation::assert_raises`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An I/O-level failure in the primitive under test
    Io,
    /// The primitive was closed or shut down
    Closed,
    /// The primitive was busy and refused the call
    Busy,
    /// The primitive observed a protocol violation
    Protocol,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::Closed => "closed",
            ErrorKind::Busy => "busy",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure reported by an asynchronous call under test
///
/// Delivered into the test body at its suspension point; escalates to a
/// test failure if the body does not handle it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("operation failed ({kind}): {message}")]
pub struct OperationError {
    /// Classification used by assertion wrappers
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl OperationError {
    /// Create a new operation error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The error's classification
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Why a test ended without its driver reaching `Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteCause {
    /// The event loop was stopped before the test body finished
    Stopped,
    /// The event loop ran out of scheduled work
    Starved,
}

impl fmt::Display for IncompleteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteCause::Stopped => f.write_str("the event loop was stopped externally"),
            IncompleteCause::Starved => f.write_str("the event loop ran out of scheduled work"),
        }
    }
}

/// Main error type for harness runs
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed harness usage, detected before any loop runs
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong with the configuration
        reason: String,
    },

    /// An underlying asynchronous call failed and the body did not handle it
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// An assertion wrapper observed a mismatch
    #[error("assertion failed: {message}")]
    Assertion {
        /// Description of the mismatch, carrying the values involved
        message: String,
    },

    /// The per-test deadline fired before the driver finished
    #[error("test '{test}' timed out after {limit:?}")]
    Timeout {
        /// Name of the test that timed out
        test: String,
        /// The effective timeout that elapsed
        limit: Duration,
    },

    /// The loop exited without the driver finishing and without a timeout
    #[error("test '{test}' did not finish: {cause}")]
    Incomplete {
        /// Name of the unfinished test
        test: String,
        /// How the loop came to exit early
        cause: IncompleteCause,
    },
}

impl HarnessError {
    /// Shorthand for an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        HarnessError::Assertion {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        HarnessError::Configuration {
            reason: reason.into(),
        }
    }
}

/// Convenient result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;
