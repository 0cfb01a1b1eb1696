//! Error types for Conveyor.

use thiserror::Error;

/// Result type alias using Conveyor's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Conveyor operations.
///
/// Errors are cheap to clone so a single terminal cause can be shared
/// between the job state machine and every completion handle observing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation was cancelled, either by the block's own scope or by
    /// the externally supplied cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// The block no longer accepts input.
    #[error("block closed for input: {0}")]
    Closed(String),

    /// The user transform function failed for one item.
    #[error("transform failed: {0}")]
    Transform(String),

    /// A callback hook failed.
    #[error("callback hook failed: {0}")]
    Callback(String),

    /// Several concurrent faults collapsed into one cause.
    #[error("aggregate of {} faults", .0.len())]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Whether this error represents a cancellation rather than a failure.
    ///
    /// An aggregate counts as a cancellation only when every constituent
    /// fault does.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Aggregate(faults) => {
                !faults.is_empty() && faults.iter().all(Error::is_cancellation)
            }
            _ => false,
        }
    }

    /// The first non-cancellation fault, flattening nested aggregates.
    ///
    /// Returns `None` when the error is a pure cancellation.
    pub fn first_fault(&self) -> Option<&Error> {
        match self {
            Error::Cancelled => None,
            Error::Aggregate(faults) => faults.iter().find_map(Error::first_fault),
            other => Some(other),
        }
    }

    /// Collapse a list of faults into a single error.
    ///
    /// Returns `None` for an empty list and unwraps a single fault instead
    /// of wrapping it.
    pub fn collect(mut faults: Vec<Error>) -> Option<Error> {
        match faults.len() {
            0 => None,
            1 => faults.pop(),
            _ => Some(Error::Aggregate(faults)),
        }
    }
}
