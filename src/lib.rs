//! CDP Mux - Multiplexed Chrome DevTools Protocol client.
//!
//! This library drives a Chromium-family browser over a single DevTools
//! WebSocket, multiplexing browser-scope commands and any number of
//! attached target sessions over that one stream.
//!
//! # Architecture
//!
//! The client is split along the protocol's seams:
//!
//! - **Transport**: one duplex text-frame stream (WebSocket)
//! - **Reader loop**: one background task per connection that owns the
//!   pending-reply and subscription tables
//! - **Sessions**: flat-mode attachments addressed by `sessionId`
//!
//! Key design principles:
//!
//! - Every command gets a unique ID and exactly one resolution
//! - Every event reaches every matching subscriber (fan-out)
//! - Waits are registered before the command that triggers them
//! - Detach always releases local state, on every exit path
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_mux::{Connection, PageCommand, Result, method};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Resolve the WebSocket endpoint through /json/version
//!     let connection = Connection::connect("http://localhost:9222").await?;
//!
//!     let target = connection.create_target("about:blank").await?;
//!     let session = connection.open_session(target).await?;
//!
//!     session.execute(PageCommand::Enable {}).await?;
//!     let loaded = session.wait_for(method::PAGE_LOAD_EVENT_FIRED)?;
//!     session
//!         .execute(PageCommand::Navigate { url: "https://example.com".into() })
//!         .await?;
//!     loaded.await?;
//!
//!     session.close().await?;
//!     connection.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`], builder, options, event subscriptions |
//! | [`session`] | [`Session`], lifecycle, [`SessionGuard`] |
//! | [`discovery`] | `/json/version` endpoint lookup |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Command, response and event types |
//! | [`transport`] | Frame transport traits and WebSocket client |

// ============================================================================
// Modules
// ============================================================================

/// Multiplexed connection.
///
/// Use [`Connection::builder()`] or [`Connection::connect`] to open one.
pub mod connection;

/// Debugger endpoint discovery over HTTP.
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Protocol message types.
///
/// Commands, responses, events and the event decoder registry.
pub mod protocol;

/// Attached target sessions.
pub mod session;

/// Frame transport layer.
///
/// [`transport::FrameSink`] / [`transport::FrameSource`] and the WebSocket
/// client implementing them.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionOptions, EventStream, EventWaiter, ListenerBuffer,
};

// Session types
pub use session::{Session, SessionGuard, SessionState};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, SessionId, SubscriptionId, TargetId};

// Protocol types
pub use protocol::{
    BrowserCommand, Command, DomCommand, Event, EventRegistry, NetworkCommand, PageCommand,
    ParsedEvent, RuntimeCommand, TargetCommand, TargetInfo, method,
};
