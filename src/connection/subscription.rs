//! Caller-side subscription handles.
//!
//! [`EventWaiter`] resolves with the first matching event; [`EventStream`]
//! yields every matching event until dropped. Both unregister themselves
//! from the reader loop when dropped, so an abandoned wait never leaks a
//! table entry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::error::{Error, Result, millis};
use crate::identifiers::{SessionId, SubscriptionId};
use crate::protocol::Event;

use super::core::ConnectionState;
use super::options::ListenerBuffer;
use super::reader::LoopCommand;
use super::router::ListenerSender;

// ============================================================================
// Registration
// ============================================================================

/// Unregisters a subscription on drop unless disarmed.
struct Registration {
    id: SubscriptionId,
    loop_tx: mpsc::UnboundedSender<LoopCommand>,
    armed: bool,
}

impl Registration {
    fn new(id: SubscriptionId, loop_tx: mpsc::UnboundedSender<LoopCommand>) -> Self {
        Self {
            id,
            loop_tx,
            armed: true,
        }
    }

    #[inline]
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.loop_tx.send(LoopCommand::Unsubscribe(self.id));
        }
    }
}

// ============================================================================
// EventWaiter
// ============================================================================

/// One-shot wait for an event.
///
/// Registered with the reader loop before it is returned, so any event the
/// caller triggers afterwards is observed.
///
/// # Example
///
/// ```ignore
/// let loaded = session.wait_for(method::PAGE_LOAD_EVENT_FIRED)?;
/// session.execute(PageCommand::Navigate { url }).await?;
/// let event = loaded.await?;
/// ```
pub struct EventWaiter {
    scope: Option<SessionId>,
    method: String,
    rx: oneshot::Receiver<Event>,
    state: Arc<ConnectionState>,
    registration: Registration,
}

impl EventWaiter {
    pub(crate) fn new(
        id: SubscriptionId,
        scope: Option<SessionId>,
        method: String,
        rx: oneshot::Receiver<Event>,
        state: Arc<ConnectionState>,
        loop_tx: mpsc::UnboundedSender<LoopCommand>,
    ) -> Self {
        Self {
            scope,
            method,
            rx,
            state,
            registration: Registration::new(id, loop_tx),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.registration.id
    }

    /// Returns the awaited event method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Waits for the event.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session detached first
    /// - [`Error::ConnectionClosed`] if the connection was torn down first
    pub async fn recv(mut self) -> Result<Event> {
        let outcome = (&mut self.rx).await;
        self.registration.disarm();

        outcome.map_err(|_| match (&self.scope, self.state.is_closed()) {
            (Some(session_id), false) => Error::session_closed(session_id.clone()),
            _ => Error::ConnectionClosed,
        })
    }

    /// Waits for the event, giving up after `duration`.
    ///
    /// The subscription is removed on timeout.
    ///
    /// # Errors
    ///
    /// As [`recv`](Self::recv), plus [`Error::Timeout`].
    pub async fn recv_timeout(self, duration: Duration) -> Result<Event> {
        let operation = format!("waiting for {}", self.method);
        timeout(duration, self.recv())
            .await
            .map_err(|_| Error::timeout(operation, millis(duration)))?
    }
}

impl IntoFuture for EventWaiter {
    type Output = Result<Event>;
    type IntoFuture = BoxFuture<'static, Result<Event>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.recv())
    }
}

impl fmt::Debug for EventWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWaiter")
            .field("id", &self.registration.id)
            .field("scope", &self.scope)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Consumer side of a listener stream.
pub(crate) enum ListenerReceiver {
    Unbounded(mpsc::UnboundedReceiver<Event>),
    Bounded(mpsc::Receiver<Event>),
}

/// Creates a listener channel for the given buffering policy.
pub(crate) fn listener_channel(buffer: ListenerBuffer) -> (ListenerSender, ListenerReceiver) {
    match buffer {
        ListenerBuffer::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (ListenerSender::Unbounded(tx), ListenerReceiver::Unbounded(rx))
        }
        ListenerBuffer::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (ListenerSender::Bounded(tx), ListenerReceiver::Bounded(rx))
        }
    }
}

/// Continuous listener.
///
/// Yields events that arrive after registration, in wire order. Ends when
/// its scope is torn down (session detach or connection close). Dropping
/// the stream unregisters it.
///
/// # Example
///
/// ```ignore
/// use futures_util::StreamExt;
///
/// let mut events = session.listen(&[method::NETWORK_RESPONSE_RECEIVED])?;
/// while let Some(event) = events.next().await {
///     println!("{:?}", event.payload);
/// }
/// ```
pub struct EventStream {
    scope: Option<SessionId>,
    rx: ListenerReceiver,
    registration: Registration,
}

impl EventStream {
    pub(crate) fn new(
        id: SubscriptionId,
        scope: Option<SessionId>,
        rx: ListenerReceiver,
        loop_tx: mpsc::UnboundedSender<LoopCommand>,
    ) -> Self {
        Self {
            scope,
            rx,
            registration: Registration::new(id, loop_tx),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.registration.id
    }

    /// Returns the scope this listener is bound to.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&SessionId> {
        self.scope.as_ref()
    }

    /// Waits for the next event. `None` once the scope is torn down.
    pub async fn recv(&mut self) -> Option<Event> {
        match &mut self.rx {
            ListenerReceiver::Unbounded(rx) => rx.recv().await,
            ListenerReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        match &mut self.get_mut().rx {
            ListenerReceiver::Unbounded(rx) => rx.poll_recv(cx),
            ListenerReceiver::Bounded(rx) => rx.poll_recv(cx),
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("id", &self.registration.id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use serde_json::Value;

    use crate::protocol::ParsedEvent;

    fn event(method: &str) -> Event {
        Event {
            method: method.to_string(),
            session_id: None,
            params: Value::Null,
            payload: ParsedEvent::Other {
                method: method.to_string(),
                params: Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn test_waiter_resolves() {
        let (loop_tx, mut loop_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();
        let waiter = EventWaiter::new(
            SubscriptionId::new(1),
            None,
            "A.b".to_string(),
            rx,
            Arc::new(ConnectionState::default()),
            loop_tx,
        );

        tx.send(event("A.b")).expect("send");
        let received = waiter.await.expect("event");
        assert_eq!(received.method, "A.b");
        assert!(loop_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_waiter_session_closed() {
        let (loop_tx, _loop_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel::<Event>();
        let waiter = EventWaiter::new(
            SubscriptionId::new(1),
            Some(SessionId::from("s1")),
            "A.b".to_string(),
            rx,
            Arc::new(ConnectionState::default()),
            loop_tx,
        );

        drop(tx);
        assert!(matches!(
            waiter.recv().await,
            Err(Error::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_waiter_connection_closed() {
        let (loop_tx, _loop_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel::<Event>();
        let state = Arc::new(ConnectionState::default());
        let waiter = EventWaiter::new(
            SubscriptionId::new(1),
            Some(SessionId::from("s1")),
            "A.b".to_string(),
            rx,
            Arc::clone(&state),
            loop_tx,
        );

        state.mark_closed();
        drop(tx);
        assert!(matches!(waiter.recv().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_waiter_timeout_unsubscribes() {
        let (loop_tx, mut loop_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = oneshot::channel::<Event>();
        let waiter = EventWaiter::new(
            SubscriptionId::new(9),
            None,
            "A.b".to_string(),
            rx,
            Arc::new(ConnectionState::default()),
            loop_tx,
        );

        let err = waiter
            .recv_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            loop_rx.try_recv(),
            Ok(LoopCommand::Unsubscribe(id)) if id == SubscriptionId::new(9)
        ));
    }

    #[tokio::test]
    async fn test_dropped_waiter_unsubscribes() {
        let (loop_tx, mut loop_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = oneshot::channel::<Event>();
        let waiter = EventWaiter::new(
            SubscriptionId::new(3),
            None,
            "A.b".to_string(),
            rx,
            Arc::new(ConnectionState::default()),
            loop_tx,
        );

        drop(waiter);
        assert!(matches!(loop_rx.try_recv(), Ok(LoopCommand::Unsubscribe(_))));
    }

    #[tokio::test]
    async fn test_stream_yields_then_ends() {
        let (loop_tx, mut loop_rx) = mpsc::unbounded_channel();
        let (tx, rx) = listener_channel(ListenerBuffer::Unbounded);
        let mut stream = EventStream::new(SubscriptionId::new(5), None, rx, loop_tx);

        let ListenerSender::Unbounded(sender) = tx else {
            panic!("expected unbounded sender");
        };
        sender.send(event("A.one")).expect("send");
        sender.send(event("A.two")).expect("send");
        drop(sender);

        assert_eq!(stream.next().await.map(|e| e.method), Some("A.one".to_string()));
        assert_eq!(stream.recv().await.map(|e| e.method), Some("A.two".to_string()));
        assert!(stream.next().await.is_none());

        drop(stream);
        assert!(matches!(loop_rx.try_recv(), Ok(LoopCommand::Unsubscribe(_))));
    }

    #[test]
    fn test_bounded_channel() {
        let (tx, _rx) = listener_channel(ListenerBuffer::Bounded(2));
        assert!(matches!(tx, ListenerSender::Bounded(_)));
    }
}
