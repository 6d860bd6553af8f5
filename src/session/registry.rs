//! Live-session table.
//!
//! Maps each attached [`SessionId`] to the state cell shared with its
//! [`Session`](super::Session) handles. The table holds cells rather than
//! sessions so a session handle, which owns a connection handle, is never
//! kept alive by the connection itself.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::identifiers::SessionId;

use super::core::SessionCell;

// ============================================================================
// SessionRegistry
// ============================================================================

/// Attached sessions by ID.
///
/// Written by attach, detach and the reader loop; read by the reader loop
/// when it installs session-scoped subscriptions.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: RwLock<FxHashMap<SessionId, Arc<SessionCell>>>,
}

impl SessionRegistry {
    /// Registers an attached session.
    pub(crate) fn insert(&self, session_id: SessionId, cell: Arc<SessionCell>) {
        let mut sessions = self.sessions.write();
        if sessions.insert(session_id.clone(), cell).is_some() {
            debug!(%session_id, "Session ID reused; replacing registry entry");
        }
    }

    /// Unregisters a session, returning its cell if it was present.
    pub(crate) fn remove(&self, session_id: &SessionId) -> Option<Arc<SessionCell>> {
        self.sessions.write().remove(session_id)
    }

    /// Unregisters `session_id` only if it still maps to `cell`.
    pub(crate) fn remove_if(&self, session_id: &SessionId, cell: &Arc<SessionCell>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(session_id) {
            Some(current) if Arc::ptr_eq(current, cell) => {
                sessions.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if the session is registered.
    #[inline]
    pub(crate) fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Number of registered sessions.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Marks every session detached and clears the table.
    pub(crate) fn invalidate_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        for (_, cell) in &drained {
            cell.mark_detached();
        }
        drained.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::SessionState;

    #[test]
    fn test_insert_and_remove() {
        let registry = SessionRegistry::default();
        let id = SessionId::from("s1");
        registry.insert(id.clone(), Arc::new(SessionCell::new()));

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_if_checks_identity() {
        let registry = SessionRegistry::default();
        let id = SessionId::from("s1");
        let old = Arc::new(SessionCell::new());
        let new = Arc::new(SessionCell::new());

        registry.insert(id.clone(), Arc::clone(&old));
        registry.insert(id.clone(), Arc::clone(&new));

        assert!(!registry.remove_if(&id, &old));
        assert!(registry.contains(&id));
        assert!(registry.remove_if(&id, &new));
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_invalidate_all_marks_detached() {
        let registry = SessionRegistry::default();
        let a = Arc::new(SessionCell::new());
        let b = Arc::new(SessionCell::new());
        registry.insert(SessionId::from("a"), Arc::clone(&a));
        registry.insert(SessionId::from("b"), Arc::clone(&b));

        assert_eq!(registry.invalidate_all(), 2);
        assert_eq!(registry.len(), 0);
        assert_eq!(a.state(), SessionState::Detached);
        assert_eq!(b.state(), SessionState::Detached);
    }
}
