//! Session handle and state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, from_value};

use crate::connection::{Connection, EventStream, EventWaiter};
use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};
use crate::protocol::Command;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a [`Session`].
///
/// ```text
/// Attached ──► Detaching ──► Detached
///     └───────────────────────▲
/// ```
///
/// A session only becomes visible once attached. `Detached` is terminal;
/// re-attaching the same target yields a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Usable.
    Attached,
    /// A detach is in flight.
    Detaching,
    /// Gone. Every operation fails with [`Error::SessionClosed`].
    Detached,
}

// ============================================================================
// SessionCell
// ============================================================================

/// State shared by every handle to one session and by the registry.
#[derive(Debug)]
pub(crate) struct SessionCell {
    state: Mutex<SessionState>,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Attached),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Moves `Attached` to `Detaching`.
    ///
    /// Returns `false` if the session was already detaching or detached, in
    /// which case the caller must not send another detach.
    pub(crate) fn begin_detach(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Attached {
            *state = SessionState::Detaching;
            true
        } else {
            false
        }
    }

    /// Moves to `Detached`. Returns `false` if it already was.
    pub(crate) fn mark_detached(&self) -> bool {
        let mut state = self.state.lock();
        let changed = *state != SessionState::Detached;
        *state = SessionState::Detached;
        changed
    }
}

// ============================================================================
// Session
// ============================================================================

pub(crate) struct SessionInner {
    pub(crate) session_id: SessionId,
    pub(crate) target_id: TargetId,
    pub(crate) cell: Arc<SessionCell>,
    pub(crate) connection: Connection,
}

/// One attached target.
///
/// Cloning shares the same session. Commands sent through a session carry
/// its session ID; events are filtered to it.
///
/// # Example
///
/// ```ignore
/// let loaded = session.wait_for(method::PAGE_LOAD_EVENT_FIRED)?;
/// session.execute(PageCommand::Navigate { url: "https://example.com".into() }).await?;
/// loaded.await?;
/// ```
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    pub(crate) fn new(
        session_id: SessionId,
        target_id: TargetId,
        cell: Arc<SessionCell>,
        connection: Connection,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id,
                target_id,
                cell,
                connection,
            }),
        }
    }

    /// Returns the browser-assigned session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns the target this session is attached to.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.inner.target_id
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.cell.state()
    }

    /// Returns `true` while commands can be sent.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state() == SessionState::Attached
    }

    /// Returns the owning connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(Error::session_closed(self.inner.session_id.clone()))
        }
    }
}

// ============================================================================
// Session - Commands and Events
// ============================================================================

impl Session {
    /// Sends a command to this session's target.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is not attached; nothing is
    ///   sent
    /// - otherwise as [`Connection::issue`]
    pub async fn execute(&self, command: impl Into<Command>) -> Result<Value> {
        self.ensure_attached()?;
        self.inner
            .connection
            .issue(Some(&self.inner.session_id), command)
            .await
    }

    /// Sends a command and deserializes its result.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`Error::Json`] if the result
    /// does not match `T`.
    pub async fn call<T: DeserializeOwned>(&self, command: impl Into<Command>) -> Result<T> {
        let value = self.execute(command).await?;
        Ok(from_value(value)?)
    }

    /// Waits for one event from this session.
    ///
    /// Call before issuing the command that triggers the event.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is not attached
    /// - [`Error::ConnectionClosed`] if the connection is closed
    pub fn wait_for(&self, method: &str) -> Result<EventWaiter> {
        self.ensure_attached()?;
        self.inner
            .connection
            .register_one_shot(Some(self.inner.session_id.clone()), method)
    }

    /// Listens to events of the given methods from this session.
    ///
    /// The stream ends when the session detaches.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is not attached
    /// - [`Error::ConnectionClosed`] if the connection is closed
    pub fn listen(&self, methods: &[&str]) -> Result<EventStream> {
        self.ensure_attached()?;
        self.inner
            .connection
            .register_listener(Some(self.inner.session_id.clone()), methods)
    }

    /// Detaches the session. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`Connection::detach`].
    pub async fn detach(&self) -> Result<()> {
        self.inner.connection.detach(self).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.inner.session_id)
            .field("target_id", &self.inner.target_id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_transitions() {
        let cell = SessionCell::new();
        assert_eq!(cell.state(), SessionState::Attached);

        assert!(cell.begin_detach());
        assert_eq!(cell.state(), SessionState::Detaching);
        assert!(!cell.begin_detach());

        assert!(cell.mark_detached());
        assert_eq!(cell.state(), SessionState::Detached);
        assert!(!cell.mark_detached());
        assert!(!cell.begin_detach());
    }

    #[test]
    fn test_mark_detached_from_attached() {
        let cell = SessionCell::new();
        assert!(cell.mark_detached());
        assert!(!cell.begin_detach());
    }
}
