//! Pool error types.

use thiserror::Error;

/// Errors surfaced by [`Pool::get`](crate::Pool::get) and pool
/// construction.
///
/// Transient session failures (resolve, connect, ping) are retried inside
/// the setup state machine and never escape individually; what escapes is
/// the exhaustion of the retry budget, carrying the last failure as its
/// source.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The setup state machine ran out of attempts.
    #[error("session setup retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: usize,
        /// The failure observed on the last attempt.
        #[source]
        source: Option<mysql_client::Error>,
    },

    /// The pool was closed.
    #[error("pool is closed")]
    Closed,

    /// The pool was constructed with unusable settings.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}
