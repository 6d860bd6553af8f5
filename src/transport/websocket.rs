//! WebSocket client transport.
//!
//! Connects to the browser's DevTools endpoint and splits the stream into
//! a [`WebSocketSink`] and a [`WebSocketSource`].
//!
//! # Connection Flow
//!
//! 1. Browser runs with `--remote-debugging-port`
//! 2. Endpoint URL is obtained (directly or via discovery)
//! 3. `connect` performs the WebSocket handshake (with timeout)
//! 4. The halves are handed to the connection's reader loop

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result, millis};

use super::{FrameSink, FrameSource};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// connect
// ============================================================================

/// Opens a WebSocket to `url` and splits it.
///
/// # Errors
///
/// - [`Error::ConnectionTimeout`] if the handshake does not finish in time
/// - [`Error::Connection`] if the handshake fails
pub async fn connect(
    url: &str,
    connect_timeout: Duration,
) -> Result<(WebSocketSink, WebSocketSource)> {
    debug!(url, "Opening WebSocket");

    let (ws_stream, _) = timeout(connect_timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| Error::connection_timeout(millis(connect_timeout)))?
        .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

    info!(url, "WebSocket connection established");

    let (write, read) = ws_stream.split();
    Ok((
        WebSocketSink {
            inner: write,
            closed: false,
        },
        WebSocketSource {
            inner: read,
            closed: false,
        },
    ))
}

// ============================================================================
// WebSocketSink
// ============================================================================

/// Write half of a WebSocket transport.
pub struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        if self.closed {
            return Err(Error::TransportClosed);
        }

        trace!(len = frame.len(), "Sending frame");

        if let Err(e) = self.inner.send(Message::Text(frame.into())).await {
            self.closed = true;
            return Err(Error::WebSocket(e));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close().await?;
        Ok(())
    }
}

// ============================================================================
// WebSocketSource
// ============================================================================

/// Read half of a WebSocket transport.
pub struct WebSocketSource {
    inner: SplitStream<WsStream>,
    closed: bool,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn receive(&mut self) -> Result<String> {
        while !self.closed {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),

                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },

                Some(Ok(Message::Close(_))) => {
                    debug!("WebSocket closed by remote");
                    self.closed = true;
                }

                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket error");
                    self.closed = true;
                }

                None => {
                    debug!("WebSocket stream ended");
                    self.closed = true;
                }

                // Ignore Ping, Pong, raw frames
                Some(Ok(_)) => {}
            }
        }

        Err(Error::TransportClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================
