//! Attach and detach.
//!
//! Detach always releases local state, whatever happens on the wire: the
//! registry entry is removed, the session is marked detached and its
//! subscriptions are closed, even if the detach command fails, times out or
//! is abandoned mid-flight.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::result::Result as StdResult;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};
use crate::protocol::{AttachResult, TargetCommand};

use super::core::{Session, SessionCell};
use super::guard::SessionGuard;

// ============================================================================
// Release
// ============================================================================

/// Drops the local state of a session without touching the wire.
pub(crate) fn release_session(connection: &Connection, session_id: &SessionId, cell: &Arc<SessionCell>) {
    connection.registry().remove_if(session_id, cell);
    if cell.mark_detached() {
        debug!(%session_id, "Session released");
    }
    connection.close_scope(session_id.clone());
}

/// Runs [`release_session`] when dropped.
struct DetachCleanup<'a> {
    session: &'a Session,
}

impl Drop for DetachCleanup<'_> {
    fn drop(&mut self) {
        let inner = &self.session.inner;
        release_session(&inner.connection, &inner.session_id, &inner.cell);
    }
}

// ============================================================================
// Connection - Session Lifecycle
// ============================================================================

impl Connection {
    /// Attaches to a target in flat mode.
    ///
    /// # Errors
    ///
    /// Returns the error of the `Target.attachToTarget` command; no session
    /// exists in that case.
    pub async fn attach(&self, target_id: impl Into<TargetId>) -> Result<Session> {
        let target_id = target_id.into();

        let result: AttachResult = self
            .call(TargetCommand::AttachToTarget {
                target_id: target_id.clone(),
                flatten: true,
            })
            .await?;
        let session_id = result.session_id;

        let cell = Arc::new(SessionCell::new());
        self.registry().insert(session_id.clone(), Arc::clone(&cell));

        // Teardown may have swept the registry before the insert.
        if self.is_closed() {
            self.registry().remove_if(&session_id, &cell);
            cell.mark_detached();
            return Err(Error::ConnectionClosed);
        }

        info!(%session_id, %target_id, "Session attached");
        Ok(Session::new(session_id, target_id, cell, self.clone()))
    }

    /// Detaches a session. Idempotent.
    ///
    /// The session is released on the session's own connection. A second
    /// call, or a call after the browser or a teardown already detached it,
    /// returns `Ok(())` at once without sending anything.
    ///
    /// # Errors
    ///
    /// Returns the command error if the browser rejected the detach. Local
    /// state is released regardless. Connection loss is not an error here.
    pub async fn detach(&self, session: &Session) -> Result<()> {
        let inner = &session.inner;
        if !inner.cell.begin_detach() {
            trace!(session_id = %inner.session_id, "Session already detached");
            return Ok(());
        }

        let _cleanup = DetachCleanup { session };

        let outcome = inner
            .connection
            .execute(TargetCommand::DetachFromTarget {
                session_id: inner.session_id.clone(),
            })
            .await;

        match outcome {
            Ok(_) => {
                info!(session_id = %inner.session_id, "Session detached");
                Ok(())
            }
            Err(e) if e.is_connection_error() => {
                debug!(session_id = %inner.session_id, error = %e, "Connection gone during detach");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %inner.session_id, error = %e, "Detach command failed");
                Err(e)
            }
        }
    }

    /// Attaches and returns a guard that detaches when closed or dropped.
    ///
    /// # Errors
    ///
    /// See [`attach`](Self::attach).
    pub async fn open_session(&self, target_id: impl Into<TargetId>) -> Result<SessionGuard> {
        let session = self.attach(target_id).await?;
        Ok(SessionGuard::new(session))
    }

    /// Runs `body` with a freshly attached session, then detaches it.
    ///
    /// The detach runs exactly once on every exit path. An error from
    /// `body` takes precedence over a detach error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let title = connection
    ///     .with_session(target_id, |session| async move {
    ///         session.execute(PageCommand::Enable {}).await?;
    ///         Ok::<_, cdp_mux::Error>("done")
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the attach error, the body's error, or the detach error.
    pub async fn with_session<F, Fut, T, E>(
        &self,
        target_id: impl Into<TargetId>,
        body: F,
    ) -> StdResult<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = StdResult<T, E>>,
        E: From<Error>,
    {
        let guard = self.open_session(target_id).await?;
        let outcome = body(guard.session().clone()).await;
        let detached = guard.close().await;

        match (outcome, detached) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(detach_error)) => {
                warn!(error = %detach_error, "Detach after failed scope also failed");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
