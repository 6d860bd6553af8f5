//! Connection tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_mux::{ConnectionOptions, ListenerBuffer};
//!
//! let options = ConnectionOptions::new()
//!     .with_command_timeout(Duration::from_secs(30))
//!     .with_listener_buffer(ListenerBuffer::Bounded(256));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::EventRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Default WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on concurrently outstanding commands.
pub const DEFAULT_MAX_PENDING: usize = 1024;

// ============================================================================
// ListenerBuffer
// ============================================================================

/// Buffering policy for listener streams.
///
/// The reader loop never waits on a slow listener. With
/// [`ListenerBuffer::Bounded`] events arriving at a full buffer are dropped
/// (and logged) for that listener only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenerBuffer {
    /// Queue without limit.
    #[default]
    Unbounded,
    /// Queue up to the given number of events, then drop new ones.
    Bounded(usize),
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Per-command deadline. `None` waits until the reply or teardown.
    pub command_timeout: Option<Duration>,

    /// WebSocket handshake deadline.
    pub connect_timeout: Duration,

    /// Maximum commands in flight before new ones are rejected.
    pub max_pending: usize,

    /// Listener buffering policy.
    pub listener_buffer: ListenerBuffer,

    /// Event decoders; unregistered events are dropped.
    pub event_registry: EventRegistry,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            command_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            listener_buffer: ListenerBuffer::default(),
            event_registry: EventRegistry::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-command deadline.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the in-flight command cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the listener buffering policy.
    #[inline]
    #[must_use]
    pub fn with_listener_buffer(mut self, buffer: ListenerBuffer) -> Self {
        self.listener_buffer = buffer;
        self
    }

    /// Replaces the event registry.
    #[inline]
    #[must_use]
    pub fn with_event_registry(mut self, registry: EventRegistry) -> Self {
        self.event_registry = registry;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero timeouts, a zero pending cap or a
    /// zero-capacity bounded buffer.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("command timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than zero"));
        }
        if self.listener_buffer == ListenerBuffer::Bounded(0) {
            return Err(Error::config("bounded listener buffer needs capacity"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
