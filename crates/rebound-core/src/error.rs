//! Error type returned by the retry loop.

use thiserror::Error;

/// Final outcome of a failed retry session.
///
/// The last operation error is surfaced unchanged; exhausting the attempt
/// cap is not a distinct variant (callers that care track attempt counts
/// themselves).
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error> {
    /// The session's cancellation token fired before a result was produced.
    #[error("retry session cancelled")]
    Cancelled,
    /// The operation failed and no further retry was allowed.
    #[error(transparent)]
    Operation(E),
}

impl<E: std::error::Error> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    /// The underlying operation error, if the session was not cancelled.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }
}
