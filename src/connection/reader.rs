//! Reader loop.
//!
//! One task per connection. It is the sole consumer of the frame source and
//! the sole writer of the pending-reply and subscription tables. Caller
//! tasks talk to it through a FIFO [`LoopCommand`] channel, so a
//! subscription registered before a command is issued is always installed
//! before that command's frame is written.
//!
//! # Event Loop
//!
//! ```text
//!   FrameSource ──► Inbound::parse ──┬─► Response ──► PendingReplies
//!                                    └─► Event    ──► EventRouter
//!
//!   LoopCommand ──┬─► Send         ──► PendingReplies + FrameSink
//!                 ├─► Cancel       ──► PendingReplies
//!                 ├─► Subscribe    ──► EventRouter
//!                 ├─► Unsubscribe  ──► EventRouter
//!                 ├─► CloseScope   ──► EventRouter
//!                 └─► Shutdown
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::to_string;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::{CommandId, SessionId, SubscriptionId};
use crate::protocol::{EventRegistry, Inbound, RawEvent, Request, method};
use crate::session::SessionRegistry;
use crate::transport::{FrameSink, FrameSource};

use super::core::ConnectionState;
use super::dispatcher::{PendingReplies, ReplySender};
use super::router::{EventRouter, Subscription};

// ============================================================================
// LoopCommand
// ============================================================================

/// Requests from caller tasks to the reader loop.
pub(crate) enum LoopCommand {
    /// Register a reply slot and write the request.
    Send {
        request: Request,
        reply_tx: ReplySender,
    },
    /// Drop the reply slot of an abandoned command.
    Cancel(CommandId),
    /// Install an event subscription.
    Subscribe(Subscription),
    /// Remove an event subscription.
    Unsubscribe(SubscriptionId),
    /// Drop every subscription of a session.
    CloseScope(SessionId),
    /// Close the transport and stop.
    Shutdown,
}

/// Whether the loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

// ============================================================================
// DispatchTables
// ============================================================================

/// State mutated only by the reader loop.
struct DispatchTables {
    pending: PendingReplies,
    router: EventRouter,
    sessions: Arc<SessionRegistry>,
}

impl DispatchTables {
    /// Routes one inbound frame.
    fn handle_frame(&mut self, frame: &str) {
        trace!(len = frame.len(), "Frame received");

        match Inbound::parse(frame) {
            Ok(Inbound::Response(response)) => {
                self.pending.resolve(response);
            }
            Ok(Inbound::Event(event)) => self.handle_event(event),
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn handle_event(&mut self, event: RawEvent) {
        let detached = remotely_detached(&event);

        self.router.dispatch(event);

        if let Some(session_id) = detached {
            self.release_session(session_id);
        }
    }

    /// Drops a session the browser detached on its own.
    fn release_session(&mut self, session_id: SessionId) {
        if let Some(cell) = self.sessions.remove(&session_id) {
            cell.mark_detached();
            debug!(%session_id, "Session detached by browser");
        }
        self.router.close_scope(&Some(session_id));
    }

    /// Applies one loop command.
    async fn handle_command(&mut self, command: LoopCommand, sink: &mut dyn FrameSink) -> Flow {
        match command {
            LoopCommand::Send { request, reply_tx } => self.send(request, reply_tx, sink).await,

            LoopCommand::Cancel(id) => {
                self.pending.cancel(id);
                Flow::Continue
            }

            LoopCommand::Subscribe(subscription) => {
                let orphaned = subscription
                    .scope
                    .as_ref()
                    .is_some_and(|session_id| !self.sessions.contains(session_id));

                if orphaned {
                    debug!(id = %subscription.id, "Subscription for detached session dropped");
                } else {
                    self.router.subscribe(subscription);
                    trace!(subscriptions = self.router.len(), "Subscription table updated");
                }
                Flow::Continue
            }

            LoopCommand::Unsubscribe(id) => {
                self.router.unsubscribe(id);
                Flow::Continue
            }

            LoopCommand::CloseScope(session_id) => {
                self.router.close_scope(&Some(session_id));
                Flow::Continue
            }

            LoopCommand::Shutdown => {
                debug!("Shutdown command received");
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Transport close failed");
                }
                Flow::Stop
            }
        }
    }

    /// Registers the reply slot, then writes the request.
    async fn send(
        &mut self,
        request: Request,
        reply_tx: ReplySender,
        sink: &mut dyn FrameSink,
    ) -> Flow {
        if reply_tx.is_closed() {
            trace!(id = %request.id, "Caller gone before send; skipping");
            return Flow::Continue;
        }

        let id = request.id;
        let frame = match to_string(&request) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply_tx.send(Err(Error::Json(e)));
                return Flow::Continue;
            }
        };

        if !self.pending.register(id, reply_tx) {
            return Flow::Continue;
        }

        trace!(%id, method = %request.command.method(), pending = self.pending.len(), "Sending command");

        match sink.send(frame).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                warn!(%id, error = %e, "Transport send failed");
                self.pending.fail(id, e);
                Flow::Stop
            }
        }
    }

    /// Fails and clears everything.
    fn teardown(&mut self) {
        let failed = self.pending.fail_all();
        let subscriptions = self.router.close_all();
        let sessions = self.sessions.invalidate_all();
        debug!(failed, subscriptions, sessions, "Dispatch tables torn down");
    }
}

/// Extracts the session of a root `Target.detachedFromTarget` event.
fn remotely_detached(event: &RawEvent) -> Option<SessionId> {
    if event.session_id.is_some() || event.method != method::TARGET_DETACHED_FROM_TARGET {
        return None;
    }
    event
        .params
        .get("sessionId")
        .and_then(|v| v.as_str())
        .map(SessionId::from)
}

// ============================================================================
// ReaderLoop
// ============================================================================

/// Everything the reader task owns.
pub(crate) struct ReaderLoop<K, S> {
    sink: K,
    source: S,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    state: Arc<ConnectionState>,
    tables: DispatchTables,
}

impl<K, S> ReaderLoop<K, S>
where
    K: FrameSink,
    S: FrameSource,
{
    pub(crate) fn new(
        sink: K,
        source: S,
        commands: mpsc::UnboundedReceiver<LoopCommand>,
        state: Arc<ConnectionState>,
        sessions: Arc<SessionRegistry>,
        registry: EventRegistry,
    ) -> Self {
        Self {
            sink,
            source,
            commands,
            state,
            tables: DispatchTables {
                pending: PendingReplies::default(),
                router: EventRouter::new(registry),
                sessions,
            },
        }
    }

    /// Runs until the transport closes or shutdown is requested, then tears
    /// the connection down.
    pub(crate) async fn run(self) {
        let Self {
            mut sink,
            mut source,
            mut commands,
            state,
            mut tables,
        } = self;

        debug!("Reader loop started");

        loop {
            // Commands first: a subscription queued before a frame is read
            // is installed before that frame is routed.
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if tables.handle_command(command, &mut sink).await == Flow::Stop {
                                break;
                            }
                        }
                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }

                frame = source.receive() => {
                    match frame {
                        Ok(frame) => tables.handle_frame(&frame),
                        Err(e) => {
                            debug!(error = %e, "Transport ended");
                            break;
                        }
                    }
                }
            }
        }

        state.mark_closed();

        // Anything queued behind the stop is answered, never sent.
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let LoopCommand::Send { reply_tx, .. } = command {
                let _ = reply_tx.send(Err(Error::ConnectionClosed));
            }
        }

        tables.teardown();
        debug!("Reader loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
