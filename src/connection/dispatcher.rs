//! Pending-reply table.
//!
//! Maps each in-flight [`CommandId`] to the channel its caller is waiting
//! on. Owned by the reader loop, which is the only task that inserts or
//! removes entries, so no locking is needed.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Channel resolving one command.
pub(crate) type ReplySender = oneshot::Sender<Result<Value>>;

// ============================================================================
// PendingReplies
// ============================================================================

/// Outstanding commands awaiting a response.
#[derive(Default)]
pub(crate) struct PendingReplies {
    table: FxHashMap<CommandId, ReplySender>,
}

impl PendingReplies {
    /// Installs the reply slot for `id`.
    ///
    /// Identifiers are never reused, so an occupied slot is a bug; the
    /// newcomer is failed instead of overwriting the original.
    pub(crate) fn register(&mut self, id: CommandId, reply_tx: ReplySender) -> bool {
        if self.table.contains_key(&id) {
            warn!(%id, "Duplicate command id; rejecting");
            let _ = reply_tx.send(Err(Error::protocol(format!("duplicate command id {id}"))));
            return false;
        }
        self.table.insert(id, reply_tx);
        true
    }

    /// Resolves and removes the slot matching `response.id`.
    ///
    /// Responses for unknown or already resolved ids are dropped.
    pub(crate) fn resolve(&mut self, response: Response) -> bool {
        let id = response.id;
        match self.table.remove(&id) {
            Some(reply_tx) => {
                if reply_tx.send(response.into_result()).is_err() {
                    trace!(%id, "Caller gone before response");
                }
                true
            }
            None => {
                debug!(%id, "Dropping response for unknown command");
                false
            }
        }
    }

    /// Fails and removes the slot for `id`.
    pub(crate) fn fail(&mut self, id: CommandId, error: Error) -> bool {
        match self.table.remove(&id) {
            Some(reply_tx) => {
                let _ = reply_tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Removes the slot for a cancelled caller without resolving it.
    pub(crate) fn cancel(&mut self, id: CommandId) -> bool {
        let removed = self.table.remove(&id).is_some();
        if removed {
            trace!(%id, "Removed cancelled command");
        }
        removed
    }

    /// Fails every slot with [`Error::ConnectionClosed`].
    pub(crate) fn fail_all(&mut self) -> usize {
        let count = self.table.len();
        for (_, reply_tx) in self.table.drain() {
            let _ = reply_tx.send(Err(Error::ConnectionClosed));
        }
        count
    }

    /// Number of outstanding commands.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::ResponseError;

    fn success(id: u64) -> Response {
        Response {
            id: CommandId::new(id),
            result: Some(json!({"ok": id})),
            error: None,
        }
    }

    #[test]
    fn test_resolve_removes_entry() {
        let mut pending = PendingReplies::default();
        let (tx, mut rx) = oneshot::channel();
        assert!(pending.register(CommandId::new(1), tx));
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(success(1)));
        assert_eq!(pending.len(), 0);

        let value = rx.try_recv().expect("resolved").expect("success");
        assert_eq!(value["ok"], 1);
    }

    #[test]
    fn test_duplicate_response_is_ignored() {
        let mut pending = PendingReplies::default();
        let (tx, mut rx) = oneshot::channel();
        pending.register(CommandId::new(1), tx);

        assert!(pending.resolve(success(1)));
        assert!(!pending.resolve(success(1)));
        assert!(rx.try_recv().expect("resolved once").is_ok());
    }

    #[test]
    fn test_unknown_response_is_dropped() {
        let mut pending = PendingReplies::default();
        assert!(!pending.resolve(success(99)));
    }

    #[test]
    fn test_error_response_becomes_command_error() {
        let mut pending = PendingReplies::default();
        let (tx, mut rx) = oneshot::channel();
        pending.register(CommandId::new(2), tx);

        pending.resolve(Response {
            id: CommandId::new(2),
            result: None,
            error: Some(ResponseError {
                code: -32000,
                message: "boom".to_string(),
                data: None,
            }),
        });

        match rx.try_recv().expect("resolved") {
            Err(Error::Command { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut pending = PendingReplies::default();
        let (first_tx, _first_rx) = oneshot::channel();
        let (second_tx, mut second_rx) = oneshot::channel();

        assert!(pending.register(CommandId::new(5), first_tx));
        assert!(!pending.register(CommandId::new(5), second_tx));
        assert_eq!(pending.len(), 1);
        assert!(second_rx.try_recv().expect("rejected").is_err());
    }

    #[test]
    fn test_cancel_then_late_response() {
        let mut pending = PendingReplies::default();
        let (tx, _rx) = oneshot::channel();
        pending.register(CommandId::new(3), tx);

        assert!(pending.cancel(CommandId::new(3)));
        assert!(!pending.resolve(success(3)));
    }

    #[test]
    fn test_fail_all() {
        let mut pending = PendingReplies::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        pending.register(CommandId::new(1), tx1);
        pending.register(CommandId::new(2), tx2);

        assert_eq!(pending.fail_all(), 2);
        assert_eq!(pending.len(), 0);
        assert!(matches!(rx1.try_recv(), Ok(Err(Error::ConnectionClosed))));
        assert!(matches!(rx2.try_recv(), Ok(Err(Error::ConnectionClosed))));
    }
}
