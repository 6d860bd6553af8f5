//! Test doubles: an in-memory transport and a scripted browser.
//!
//! [`MockBrowser`] sees every frame the connection sends and can answer,
//! fail, emit events or hang up. It is backed either by channels
//! ([`connect_mock`]) or by a real loopback WebSocket ([`ws_mock`]).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::{Connection, ConnectionOptions};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{FrameSink, FrameSource};

// ============================================================================
// Constants
// ============================================================================

/// How long the mock waits for the client to send something.
const COMMAND_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Memory Transport
// ============================================================================

/// Client write half backed by a channel.
pub(crate) struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    sent: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<()> {
        if self.closed || self.tx.send(frame).is_err() {
            self.closed = true;
            return Err(Error::TransportClosed);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Client read half backed by a channel.
pub(crate) struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<String> {
        if !self.closed {
            match self.rx.recv().await {
                Some(frame) => return Ok(frame),
                None => self.closed = true,
            }
        }
        Err(Error::TransportClosed)
    }
}

// ============================================================================
// MockBrowser
// ============================================================================

/// The browser end of a test connection.
pub(crate) struct MockBrowser {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<String>>,
    sent: Arc<AtomicUsize>,
}

impl MockBrowser {
    /// Waits for the next frame the client sent.
    pub(crate) async fn next_command(&mut self) -> Value {
        let frame = timeout(COMMAND_WAIT, self.outbound.recv())
            .await
            .expect("client sent nothing in time")
            .expect("client transport gone");
        serde_json::from_str(&frame).expect("client frame is JSON")
    }

    /// Returns the next sent frame if one is queued.
    pub(crate) fn try_next_command(&mut self) -> Option<Value> {
        let frame = self.outbound.try_recv().ok()?;
        serde_json::from_str(&frame).ok()
    }

    /// Asserts the client sends nothing for `quiet`.
    pub(crate) async fn assert_no_command(&mut self, quiet: Duration) {
        if let Ok(Some(frame)) = timeout(quiet, self.outbound.recv()).await {
            panic!("unexpected frame: {frame}");
        }
    }

    /// Number of frames the client has sent.
    pub(crate) fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Answers `command` with a result.
    pub(crate) fn reply(&self, command: &Value, result: Value) {
        let mut frame = json!({"id": command["id"], "result": result});
        if let Some(session_id) = command.get("sessionId") {
            frame["sessionId"] = session_id.clone();
        }
        self.send_raw(frame.to_string());
    }

    /// Answers `command` with a protocol error.
    pub(crate) fn reply_error(&self, command: &Value, code: i64, message: &str) {
        let frame = json!({
            "id": command["id"],
            "error": {"code": code, "message": message}
        });
        self.send_raw(frame.to_string());
    }

    /// Emits an event, optionally from a session.
    pub(crate) fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        let mut frame = json!({"method": method, "params": params});
        if let Some(session_id) = session_id {
            frame["sessionId"] = json!(session_id);
        }
        self.send_raw(frame.to_string());
    }

    /// Sends an arbitrary text frame.
    pub(crate) fn send_raw(&self, frame: impl Into<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(frame.into());
        }
    }

    /// Closes the browser side of the transport.
    pub(crate) fn disconnect(&mut self) {
        self.inbound = None;
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Creates a connected in-memory transport.
pub(crate) fn memory_transport() -> (MemorySink, MemorySource, MockBrowser) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(AtomicUsize::new(0));

    (
        MemorySink {
            tx: out_tx,
            sent: Arc::clone(&sent),
            closed: false,
        },
        MemorySource {
            rx: in_rx,
            closed: false,
        },
        MockBrowser {
            outbound: out_rx,
            inbound: Some(in_tx),
            sent,
        },
    )
}

/// Opens a connection over an in-memory transport with default options.
pub(crate) fn connect_mock() -> (Connection, MockBrowser) {
    connect_mock_with(ConnectionOptions::default())
}

/// Opens a connection over an in-memory transport.
pub(crate) fn connect_mock_with(options: ConnectionOptions) -> (Connection, MockBrowser) {
    let (sink, source, browser) = memory_transport();
    let connection = Connection::from_transport(sink, source, options).expect("valid options");
    (connection, browser)
}

/// Attaches `target_id`, answering with `session_id`.
pub(crate) async fn attach_mock(
    connection: &Connection,
    browser: &mut MockBrowser,
    target_id: &str,
    session_id: &str,
) -> Session {
    let task = tokio::spawn({
        let connection = connection.clone();
        let target_id = target_id.to_string();
        async move { connection.attach(target_id).await }
    });

    let frame = browser.next_command().await;
    assert_eq!(frame["method"], "Target.attachToTarget");
    assert_eq!(frame["params"]["targetId"], target_id);
    browser.reply(&frame, json!({"sessionId": session_id}));

    task.await.expect("join").expect("attach")
}

/// Starts a loopback WebSocket server relaying to a [`MockBrowser`].
///
/// Returns the `ws://` URL to connect to. Serves one client.
pub(crate) async fn ws_mock() -> (String, MockBrowser) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<String>();
    let sent = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sent);

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if out_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                frame = in_rx.recv() => match frame {
                    Some(frame) => {
                        if write.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = write.close().await;
                        break;
                    }
                },
            }
        }
    });

    let browser = MockBrowser {
        outbound: out_rx,
        inbound: Some(in_tx),
        sent,
    };
    (format!("ws://127.0.0.1:{port}/devtools/browser/mock"), browser)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_round_trip() {
        let (mut sink, mut source, mut browser) = memory_transport();

        sink.send(r#"{"id":1,"method":"A.b","params":{}}"#.to_string())
            .await
            .expect("send");
        let frame = browser.next_command().await;
        assert_eq!(frame["method"], "A.b");
        assert_eq!(browser.sent_count(), 1);

        browser.reply(&frame, json!({"ok": true}));
        let reply: Value = serde_json::from_str(&source.receive().await.expect("receive"))
            .expect("json");
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["ok"], true);
        assert!(browser.try_next_command().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_sticky() {
        let (_sink, mut source, mut browser) = memory_transport();
        browser.disconnect();

        assert!(matches!(source.receive().await, Err(Error::TransportClosed)));
        assert!(matches!(source.receive().await, Err(Error::TransportClosed)));
    }
}
