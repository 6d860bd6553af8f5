//! Error types for the CDP multiplexer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_mux::{Error, Result};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.execute(PageCommand::Enable).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::TransportClosed`] |
//! | Command | [`Error::Command`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | Session | [`Error::SessionClosed`] |
//! | Events | [`Error::Timeout`] |
//! | Discovery | [`Error::Discovery`], [`Error::Http`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CommandId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Connection-loss variants ([`Error::ConnectionClosed`],
/// [`Error::TransportClosed`]) are kept distinct from per-call failures such
/// as [`Error::Command`] so callers can tell "this call failed" apart from
/// "the whole connection is gone".
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out establishing the connection.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection was torn down while the operation was outstanding,
    /// or the operation was attempted after teardown.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The underlying frame stream was closed by the peer or failed.
    ///
    /// Sticky: once a transport reports this, every later call does too.
    #[error("Transport closed")]
    TransportClosed,

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// The browser rejected a command.
    ///
    /// Local to one command; other in-flight commands are unaffected.
    #[error("Command error {code}: {message}")]
    Command {
        /// Protocol error code.
        code: i64,
        /// Protocol error message.
        message: String,
    },

    /// Command response not received within the configured timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command ID that timed out.
        request_id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or unexpected payload shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Command or wait issued through a detached session.
    #[error("Session closed: {session_id}")]
    SessionClosed {
        /// The detached session.
        session_id: SessionId,
    },

    // ========================================================================
    // Event Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Discovery Errors
    // ========================================================================
    /// The version endpoint did not advertise a debugger URL.
    #[error("{message}")]
    Discovery {
        /// Description of the discovery failure.
        message: String,
    },

    /// HTTP request to the debugging port failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a command error from a protocol error response.
    #[inline]
    pub fn command(code: i64, message: impl Into<String>) -> Self {
        Self::Command {
            code,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed { session_id }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: CommandId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a discovery error.
    #[inline]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the error means the connection itself is gone.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::TransportClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the browser rejected the command.
    #[inline]
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::Command { .. })
    }

    /// Returns `true` if the operation targeted a detached session.
    #[inline]
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed { .. })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
#[inline]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
