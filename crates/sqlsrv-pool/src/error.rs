//! Pool errors.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the pool, generic over the manager's own error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError<E> {
    /// No connection became available within the acquisition timeout.
    #[error("no connection available within {0:?}")]
    AcquireTimeout(Duration),

    /// The pool has been shut down.
    #[error("pool is shut down")]
    Closed,

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Configuration(&'static str),

    /// Connecting or validating failed in the connection manager.
    #[error(transparent)]
    Backend(E),
}

impl<E> PoolError<E> {
    /// Whether a retry at the pool boundary could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AcquireTimeout(_))
    }
}
