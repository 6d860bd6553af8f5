//! Scoped session ownership.

// ============================================================================
// Imports
// ============================================================================

use std::ops::Deref;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::Result;

use super::core::Session;
use super::lifecycle::release_session;

// ============================================================================
// SessionGuard
// ============================================================================

/// A session that is detached when the guard goes away.
///
/// [`close`](Self::close) detaches and reports the outcome. If the guard is
/// dropped instead (early return, cancellation, panic), the detach is
/// spawned onto the current runtime; without a runtime only the local state
/// is released.
///
/// # Example
///
/// ```ignore
/// let session = connection.open_session(target_id).await?;
/// session.execute(PageCommand::Enable {}).await?;
/// session.close().await?;
/// ```
#[must_use = "dropping the guard detaches the session"]
pub struct SessionGuard {
    session: Session,
    released: bool,
}

impl SessionGuard {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            released: false,
        }
    }

    /// Returns the guarded session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Detaches the session.
    ///
    /// # Errors
    ///
    /// See [`Connection::detach`](crate::Connection::detach).
    pub async fn close(mut self) -> Result<()> {
        self.released = true;
        self.session.detach().await
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released || !self.session.is_attached() {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let session = self.session.clone();
                debug!(session_id = %session.id(), "Guard dropped; detaching in background");
                handle.spawn(async move {
                    if let Err(e) = session.detach().await {
                        warn!(session_id = %session.id(), error = %e, "Background detach failed");
                    }
                });
            }
            Err(_) => {
                let inner = &self.session.inner;
                warn!(session_id = %inner.session_id, "No runtime; releasing session without detach");
                release_session(&inner.connection, &inner.session_id, &inner.cell);
            }
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("session", &self.session)
            .field("released", &self.released)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
