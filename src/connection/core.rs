//! Connection handle and command issuing.
//!
//! A [`Connection`] is a cheap, cloneable handle. The last handle dropped
//! shuts the reader loop down.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, from_value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result, millis};
use crate::identifiers::{CommandId, IdAllocator, SessionId, SubscriptionId};
use crate::protocol::{Command, Request};
use crate::session::SessionRegistry;
use crate::transport::{FrameSink, FrameSource};

use super::builder::ConnectionBuilder;
use super::options::ConnectionOptions;
use super::reader::{LoopCommand, ReaderLoop};
use super::router::{Delivery, Subscription};
use super::subscription::{EventStream, EventWaiter, listener_channel};

// ============================================================================
// ConnectionState
// ============================================================================

/// Liveness flag shared with the reader loop.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    closed: AtomicBool,
}

impl ConnectionState {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns `true` for the call that actually closed it.
    #[inline]
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Counts one caller against `max_pending`.
struct InFlightSlot<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightSlot<'a> {
    fn acquire(counter: &'a AtomicUsize, max: usize) -> Result<Self> {
        let previous = counter.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            counter.fetch_sub(1, Ordering::AcqRel);
            warn!(pending = previous, max, "Too many pending requests");
            return Err(Error::protocol(format!(
                "Too many pending requests: {previous}/{max}"
            )));
        }
        Ok(Self { counter })
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cancels the reply slot if the caller stops waiting.
struct PendingGuard<'a> {
    id: CommandId,
    loop_tx: &'a mpsc::UnboundedSender<LoopCommand>,
    armed: bool,
}

impl PendingGuard<'_> {
    #[inline]
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            trace!(id = %self.id, "Command abandoned; cancelling");
            let _ = self.loop_tx.send(LoopCommand::Cancel(self.id));
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

pub(crate) struct ConnectionInner {
    loop_tx: mpsc::UnboundedSender<LoopCommand>,
    state: Arc<ConnectionState>,
    registry: Arc<SessionRegistry>,
    command_ids: IdAllocator,
    subscription_ids: IdAllocator,
    in_flight: AtomicUsize,
    options: ConnectionOptions,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let _ = self.loop_tx.send(LoopCommand::Shutdown);
    }
}

/// Multiplexed client connection to a browser.
///
/// All sessions share the one transport. Commands from any number of
/// tasks may be in flight at once; the reader loop routes each response
/// back to its caller and each event to its subscribers.
///
/// # Example
///
/// ```no_run
/// use cdp_mux::{Connection, TargetId};
///
/// # async fn example() -> cdp_mux::Result<()> {
/// let connection = Connection::connect("http://localhost:9222").await?;
/// let session = connection.attach(TargetId::from("ABC123")).await?;
/// // ...
/// connection.detach(&session).await?;
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connects to a `ws://` endpoint, or resolves an `http://` one first.
    ///
    /// # Errors
    ///
    /// See [`ConnectionBuilder::connect`].
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        ConnectionBuilder::new().endpoint(endpoint).connect().await
    }

    /// Starts a connection over an already established transport.
    ///
    /// Spawns the reader loop, so it must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation; the reader
    /// loop is not started in that case.
    pub fn from_transport<K, S>(sink: K, source: S, options: ConnectionOptions) -> Result<Self>
    where
        K: FrameSink + 'static,
        S: FrameSource + 'static,
    {
        options.validate()?;

        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ConnectionState::default());
        let registry = Arc::new(SessionRegistry::default());

        let reader = ReaderLoop::new(
            sink,
            source,
            loop_rx,
            Arc::clone(&state),
            Arc::clone(&registry),
            options.event_registry.clone(),
        );
        let handle = tokio::spawn(reader.run());

        debug!("Connection started");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                loop_tx,
                state,
                registry,
                command_ids: IdAllocator::new(),
                subscription_ids: IdAllocator::new(),
                in_flight: AtomicUsize::new(0),
                options,
                reader: Mutex::new(Some(handle)),
            }),
        })
    }
}

// ============================================================================
// Connection - Commands
// ============================================================================

impl Connection {
    /// Sends a command and waits for its result.
    ///
    /// `session_id` of `None` addresses the browser itself. This is the
    /// primitive every other command method goes through; it does not check
    /// session liveness.
    ///
    /// # Errors
    ///
    /// - [`Error::Command`] if the browser rejected the command
    /// - [`Error::ConnectionClosed`] if the connection is or becomes closed
    /// - [`Error::RequestTimeout`] if a command timeout is configured and hit
    /// - [`Error::Protocol`] if too many commands are in flight
    pub async fn issue(
        &self,
        session_id: Option<&SessionId>,
        command: impl Into<Command>,
    ) -> Result<Value> {
        let inner = &*self.inner;
        if inner.state.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let _slot = InFlightSlot::acquire(&inner.in_flight, inner.options.max_pending)?;

        let id = CommandId::new(inner.command_ids.next());
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::new(id, session_id.cloned(), command.into());

        inner
            .loop_tx
            .send(LoopCommand::Send { request, reply_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        let mut guard = PendingGuard {
            id,
            loop_tx: &inner.loop_tx,
            armed: true,
        };

        let outcome = match inner.options.command_timeout {
            Some(limit) => match timeout(limit, reply_rx).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(Error::request_timeout(id, millis(limit))),
            },
            None => reply_rx.await,
        };

        guard.disarm();
        outcome.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends a browser-scope command.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    #[inline]
    pub async fn execute(&self, command: impl Into<Command>) -> Result<Value> {
        self.issue(None, command).await
    }

    /// Sends a browser-scope command and deserializes its result.
    ///
    /// # Errors
    ///
    /// As [`issue`](Self::issue), plus [`Error::Json`] if the result does
    /// not match `T`.
    pub async fn call<T: DeserializeOwned>(&self, command: impl Into<Command>) -> Result<T> {
        let value = self.issue(None, command).await?;
        Ok(from_value(value)?)
    }
}

// ============================================================================
// Connection - Events
// ============================================================================

impl Connection {
    /// Waits for one browser-scope event.
    ///
    /// Call before issuing the command that triggers the event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is closed.
    pub fn wait_for(&self, method: &str) -> Result<EventWaiter> {
        self.register_one_shot(None, method)
    }

    /// Listens to browser-scope events of the given methods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is closed.
    pub fn listen(&self, methods: &[&str]) -> Result<EventStream> {
        self.register_listener(None, methods)
    }

    pub(crate) fn register_one_shot(
        &self,
        scope: Option<SessionId>,
        method: &str,
    ) -> Result<EventWaiter> {
        let inner = &*self.inner;
        if inner.state.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = SubscriptionId::new(inner.subscription_ids.next());
        let (tx, rx) = oneshot::channel();

        inner
            .loop_tx
            .send(LoopCommand::Subscribe(Subscription {
                id,
                scope: scope.clone(),
                methods: vec![method.to_string()],
                delivery: Delivery::Once(Some(tx)),
            }))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(EventWaiter::new(
            id,
            scope,
            method.to_string(),
            rx,
            Arc::clone(&inner.state),
            inner.loop_tx.clone(),
        ))
    }

    pub(crate) fn register_listener(
        &self,
        scope: Option<SessionId>,
        methods: &[&str],
    ) -> Result<EventStream> {
        let inner = &*self.inner;
        if inner.state.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = SubscriptionId::new(inner.subscription_ids.next());
        let (tx, rx) = listener_channel(inner.options.listener_buffer);

        inner
            .loop_tx
            .send(LoopCommand::Subscribe(Subscription {
                id,
                scope: scope.clone(),
                methods: methods.iter().map(|m| (*m).to_string()).collect(),
                delivery: Delivery::Stream(tx),
            }))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(EventStream::new(id, scope, rx, inner.loop_tx.clone()))
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Shuts the connection down and waits for the reader loop to finish.
    ///
    /// Pending commands fail with [`Error::ConnectionClosed`], listeners
    /// end and every session becomes detached. No detach commands are sent.
    pub async fn close(&self) {
        let _ = self.inner.loop_tx.send(LoopCommand::Shutdown);

        let handle = self.inner.reader.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Reader task failed");
        }
    }

    /// Returns `true` once the connection is torn down.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Returns the number of attached sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns the options this connection was opened with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }
}

// ============================================================================
// Connection - Internal
// ============================================================================

impl Connection {
    #[inline]
    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Drops every subscription of `session_id`.
    pub(crate) fn close_scope(&self, session_id: SessionId) {
        let _ = self.inner.loop_tx.send(LoopCommand::CloseScope(session_id));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_count())
            .field("sessions", &self.session_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::protocol::{
        BrowserCommand, BrowserVersion, Command, ParsedEvent, TargetCommand, method,
    };
    use crate::connection::ListenerBuffer;
    use crate::testing::{connect_mock, connect_mock_with, memory_transport};

    #[tokio::test]
    async fn test_issue_resolves_result() {
        let (connection, mut browser) = connect_mock();

        let task = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(BrowserCommand::GetVersion {}).await }
        });

        let frame = browser.next_command().await;
        assert_eq!(frame["method"], "Browser.getVersion");
        assert!(frame.get("sessionId").is_none());
        browser.reply(&frame, json!({"product": "Chrome/120"}));

        let result = task.await.expect("join").expect("result");
        assert_eq!(result["product"], "Chrome/120");
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_deserializes() {
        let (connection, mut browser) = connect_mock();

        let task = tokio::spawn({
            let connection = connection.clone();
            async move {
                connection
                    .call::<BrowserVersion>(BrowserCommand::GetVersion {})
                    .await
            }
        });

        let frame = browser.next_command().await;
        browser.reply(
            &frame,
            json!({
                "protocolVersion": "1.3",
                "product": "Chrome/120",
                "userAgent": "UA",
                "jsVersion": "12"
            }),
        );

        let version = task.await.expect("join").expect("version");
        assert_eq!(version.product, "Chrome/120");
    }

    #[tokio::test]
    async fn test_command_ids_are_unique() {
        let (connection, mut browser) = connect_mock();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let connection = connection.clone();
            tasks.push(tokio::spawn(async move {
                connection.execute(TargetCommand::GetTargets {}).await
            }));
        }

        let mut ids = Vec::new();
        for _ in 0..20 {
            let frame = browser.next_command().await;
            ids.push(frame["id"].as_u64().expect("numeric id"));
            browser.reply(&frame, json!({"targetInfos": []}));
        }
        for task in tasks {
            task.await.expect("join").expect("result");
        }

        let count = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let (connection, mut browser) = connect_mock();

        let first = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.first", json!({}))).await }
        });
        let first_frame = browser.next_command().await;

        let second = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.second", json!({}))).await }
        });
        let second_frame = browser.next_command().await;

        browser.reply(&second_frame, json!({"n": 2}));
        browser.reply(&first_frame, json!({"n": 1}));

        assert_eq!(first.await.expect("join").expect("first")["n"], 1);
        assert_eq!(second.await.expect("join").expect("second")["n"], 2);
    }

    #[tokio::test]
    async fn test_command_error_is_local() {
        let (connection, mut browser) = connect_mock();

        let failing = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.fail", json!({}))).await }
        });
        let failing_frame = browser.next_command().await;

        let healthy = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.ok", json!({}))).await }
        });
        let healthy_frame = browser.next_command().await;

        browser.reply_error(&failing_frame, -32601, "'A.fail' wasn't found");
        browser.reply(&healthy_frame, json!({}));

        let err = failing.await.expect("join").unwrap_err();
        assert!(err.is_command_error());
        assert!(healthy.await.expect("join").is_ok());
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_duplicate_response_ignored() {
        let (connection, mut browser) = connect_mock();

        let task = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.b", json!({}))).await }
        });
        let frame = browser.next_command().await;
        browser.reply(&frame, json!({"n": 1}));
        browser.reply(&frame, json!({"n": 2}));

        assert_eq!(task.await.expect("join").expect("result")["n"], 1);

        // The connection keeps working after the stray response.
        let next = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.c", json!({}))).await }
        });
        let frame = browser.next_command().await;
        browser.reply(&frame, json!({"n": 3}));
        assert_eq!(next.await.expect("join").expect("result")["n"], 3);
    }

    #[tokio::test]
    async fn test_teardown_fails_pending_and_ends_listener() {
        let (connection, mut browser) = connect_mock();
        let mut listener = connection
            .listen(&[method::TARGET_TARGET_CREATED])
            .expect("listen");

        let mut tasks = Vec::new();
        for name in ["A.one", "A.two"] {
            let connection = connection.clone();
            tasks.push(tokio::spawn(async move {
                connection.execute(Command::raw(name, json!({}))).await
            }));
        }
        browser.next_command().await;
        browser.next_command().await;

        browser.disconnect();

        for task in tasks {
            let err = task.await.expect("join").unwrap_err();
            assert!(matches!(err, Error::ConnectionClosed));
        }
        assert!(listener.recv().await.is_none());
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_issue_after_close_is_rejected() {
        let (connection, browser) = connect_mock();
        connection.close().await;

        let err = connection
            .execute(Command::raw("A.b", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(connection.wait_for(method::TARGET_TARGET_CREATED).is_err());
        assert_eq!(browser.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_removes_pending() {
        let (connection, mut browser) = connect_mock();

        let task = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.slow", json!({}))).await }
        });
        let frame = browser.next_command().await;
        assert_eq!(connection.pending_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(connection.pending_count(), 0);

        // A late response for the cancelled command is dropped quietly.
        browser.reply(&frame, json!({}));

        let next = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.next", json!({}))).await }
        });
        let frame = browser.next_command().await;
        browser.reply(&frame, json!({"ok": true}));
        assert!(next.await.expect("join").is_ok());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let options = ConnectionOptions::new().with_command_timeout(Duration::from_millis(50));
        let (connection, mut browser) = connect_mock_with(options);

        let task = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.never", json!({}))).await }
        });
        browser.next_command().await;

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { .. }));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_from_transport_rejects_invalid_options() {
        let (sink, source, _browser) = memory_transport();
        let options = ConnectionOptions::new().with_listener_buffer(ListenerBuffer::Bounded(0));
        let err = Connection::from_transport(sink, source, options).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let (sink, source, _browser) = memory_transport();
        let options = ConnectionOptions::new().with_max_pending(0);
        assert!(matches!(
            Connection::from_transport(sink, source, options),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_bounded_listener_over_memory_transport() {
        let options = ConnectionOptions::new().with_listener_buffer(ListenerBuffer::Bounded(1));
        let (connection, browser) = connect_mock_with(options);

        let mut events = connection
            .listen(&[method::NETWORK_RESPONSE_RECEIVED])
            .expect("listen");
        browser.emit(
            method::NETWORK_RESPONSE_RECEIVED,
            json!({
                "requestId": "r1",
                "frameId": "f1",
                "response": {
                    "url": "u",
                    "status": 200,
                    "mimeType": "text/html",
                    "headers": {"server": "test"}
                }
            }),
            None,
        );

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("in time")
            .expect("event");
        assert!(matches!(
            event.payload,
            ParsedEvent::NetworkResponseReceived { status: 200, .. }
        ));
        assert_eq!(event.params["frameId"], "f1");
        assert_eq!(event.params["response"]["mimeType"], "text/html");
        assert_eq!(event.params["response"]["headers"]["server"], "test");
    }

    #[tokio::test]
    async fn test_error_without_message_resolves_caller() {
        let (connection, mut browser) = connect_mock();

        let task = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(BrowserCommand::GetVersion {}).await }
        });

        let frame = browser.next_command().await;
        browser.send_raw(json!({"id": frame["id"], "error": {"code": -32000}}).to_string());

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("resolved in time")
            .expect("join")
            .unwrap_err();
        assert!(err.is_command_error());
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_max_pending_rejects() {
        let options = ConnectionOptions::new().with_max_pending(1);
        let (connection, mut browser) = connect_mock_with(options);

        let first = tokio::spawn({
            let connection = connection.clone();
            async move { connection.execute(Command::raw("A.one", json!({}))).await }
        });
        let frame = browser.next_command().await;

        let err = connection
            .execute(Command::raw("A.two", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        browser.reply(&frame, json!({}));
        assert!(first.await.expect("join").is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_root_event() {
        let (connection, mut browser) = connect_mock();
        let waiter = connection
            .wait_for(method::TARGET_TARGET_CREATED)
            .expect("wait");

        let task = tokio::spawn({
            let connection = connection.clone();
            async move {
                connection
                    .execute(TargetCommand::CreateTarget {
                        url: "about:blank".to_string(),
                    })
                    .await
            }
        });

        // The browser emits the event before answering the command.
        let frame = browser.next_command().await;
        browser.emit(
            method::TARGET_TARGET_CREATED,
            json!({"targetInfo": {"targetId": "t9", "type": "page", "url": "about:blank"}}),
            None,
        );
        browser.reply(&frame, json!({"targetId": "t9"}));

        let event = waiter.await.expect("event");
        assert!(matches!(
            event.payload,
            ParsedEvent::TargetCreated { ref target_id, .. } if target_id.as_str() == "t9"
        ));
        task.await.expect("join").expect("created");
    }
}
