//! Request error types

use std::time::Duration;
use thiserror::Error;

/// Why a submitted request did not produce a value
///
/// `E` is whatever error the operation itself fails with; it is forwarded
/// untouched.
#[derive(Debug, Error)]
pub enum RequestError<E> {
    /// Cancelled through `clear_queue`, `cancel`, or scheduler shutdown
    #[error("Request cancelled")]
    Cancelled,

    /// Operation panicked while running
    #[error("Request panicked")]
    Panicked,

    /// Operation ran longer than the configured timeout
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation's own error
    #[error("{0}")]
    Operation(E),
}

impl<E> RequestError<E> {
    /// Check if this request was cancelled by the scheduler
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }

    /// Check if this request's operation panicked
    pub fn is_panicked(&self) -> bool {
        matches!(self, RequestError::Panicked)
    }

    /// Check if this request hit the operation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::TimedOut(_))
    }

    /// Take the operation's own error, if that is what this is
    pub fn into_operation(self) -> Option<E> {
        match self {
            RequestError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
