//! Frame transport layer.
//!
//! This module owns the duplex message stream between the client and the
//! browser. It moves opaque text frames and reports stream closure; no
//! protocol semantics live here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Connection     │                              │  Browser        │
//! │                 │         WebSocket            │                 │
//! │  FrameSink    ──┼─────────────────────────────►│  DevTools       │
//! │  FrameSource  ◄─┼──────────────────────────────┤  endpoint       │
//! │                 │   ws://host:port/devtools/…  │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! The two halves are split so the reader loop can wait on the source while
//! writing through the sink.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` client implementation |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Traits
// ============================================================================

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one complete frame. May wait under backpressure.
    ///
    /// # Errors
    ///
    /// Fails if the stream is closed or the write errors.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Closes the outbound half.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next inbound frame.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportClosed`] once the peer closes or the
    /// stream fails, and on every call after that.
    async fn receive(&mut self) -> Result<String>;
}

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{WebSocketSink, WebSocketSource, connect};
