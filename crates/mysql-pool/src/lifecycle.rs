//! Per-entry lifecycle: states and the setup state machine.
//!
//! An entry is acquired by the pool (its `locked` flag set under the
//! bookkeeping mutex) and then driven to `InUse` by [`setup_entry`],
//! which owns the entry exclusively for the duration: it is the only
//! mutator of the entry's state while the flag is held.

use tokio::time::sleep;

use crate::pool::PoolInner;
use crate::session::{ManagedSession, SessionFactory};
use crate::PoolError;

/// Lifecycle state of one pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live stream: never connected, or the session was discarded
    /// after a failure.
    NotConnected,
    /// A live, authenticated session with no current user. The peer may
    /// have silently closed it, so it is ping-checked before reuse.
    Idle,
    /// Just returned by a user; handed out again without a wire reset.
    /// (The state is reserved for a coming reset-on-return pass; until
    /// then, leftover session state is the next caller's concern.)
    PendingReset,
    /// Currently borrowed.
    InUse,
}

/// Drive one acquired entry to `InUse`, retrying transient failures.
///
/// Per attempt, the move depends on the entry's current state:
///
/// - `NotConnected`: resolve the server, connect to the first endpoint.
///   Either step failing burns the attempt and sleeps out the retry
///   delay.
/// - `Idle`: ping. A dead session is closed (result ignored), replaced
///   with a fresh one from the factory, and the entry goes back to
///   `NotConnected` for the next attempt.
/// - `PendingReset`: handed out as-is.
///
/// Once the budget is spent the last failure is wrapped in
/// [`PoolError::RetriesExhausted`]. Cancellation (dropping the future at
/// any await point) needs no handling here: the caller's release guard
/// restores the entry's flags.
pub(crate) async fn setup_entry<F: SessionFactory>(
    pool: &PoolInner<F>,
    index: usize,
    session: &mut F::Session,
) -> Result<(), PoolError> {
    let attempts = pool.config.max_setup_attempts;
    let mut last_error = None;

    for attempt in 1..=attempts {
        let state = pool.entry_state(index);
        tracing::debug!(index, attempt, ?state, "pool entry setup pass");

        match state {
            SessionState::NotConnected => {
                // Multi-endpoint failover is out of scope; first wins.
                let endpoint = match session
                    .resolve(&pool.connect.host, pool.connect.port)
                    .await
                    .map(|endpoints| endpoints.into_iter().next())
                {
                    Ok(Some(endpoint)) => endpoint,
                    Ok(None) => {
                        tracing::debug!(index, attempt, "resolve returned no addresses");
                        pool.note_setup_retry();
                        sleep(pool.config.retry_delay).await;
                        continue;
                    }
                    Err(err) => {
                        tracing::debug!(index, attempt, error = %err, "resolve failed");
                        last_error = Some(err);
                        pool.note_setup_retry();
                        sleep(pool.config.retry_delay).await;
                        continue;
                    }
                };

                match session.connect(endpoint, &pool.connect).await {
                    Ok(()) => {
                        pool.set_entry_state(index, SessionState::InUse);
                        return Ok(());
                    }
                    Err(err) => {
                        tracing::debug!(index, attempt, error = %err, "connect failed");
                        last_error = Some(err);
                        pool.note_setup_retry();
                        sleep(pool.config.retry_delay).await;
                        continue;
                    }
                }
            }

            SessionState::PendingReset => {
                pool.set_entry_state(index, SessionState::InUse);
                return Ok(());
            }

            SessionState::Idle => match session.ping().await {
                Ok(()) => {
                    pool.set_entry_state(index, SessionState::InUse);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(index, error = %err, "idle session is stale, replacing it");
                    let _ = session.close().await;
                    // A dead TLS stream cannot be revived in place.
                    *session = pool.factory.create_session();
                    pool.set_entry_state(index, SessionState::NotConnected);
                    pool.note_session_recreated();
                    last_error = Some(err);
                    pool.note_setup_retry();
                    sleep(pool.config.retry_delay).await;
                    continue;
                }
            },

            // Unreachable through the pool: acquisition never selects an
            // in-use entry. Nothing to do.
            SessionState::InUse => return Ok(()),
        }
    }

    Err(PoolError::RetriesExhausted {
        attempts,
        source: last_error,
    })
}
