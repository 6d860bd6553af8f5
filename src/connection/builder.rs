//! Builder pattern for opening a connection.
//!
//! Provides a fluent API for configuring and establishing a [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cdp_mux::Connection;
//!
//! # async fn example() -> cdp_mux::Result<()> {
//! let connection = Connection::builder()
//!     .endpoint("http://localhost:9222")
//!     .command_timeout(Duration::from_secs(30))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::discovery;
use crate::error::{Error, Result};
use crate::protocol::EventRegistry;
use crate::transport;

use super::core::Connection;
use super::options::{ConnectionOptions, ListenerBuffer};

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ConnectionBuilder {
    /// `ws://`, `wss://` or `http://` endpoint.
    endpoint: Option<String>,
    /// Connection options.
    options: ConnectionOptions,
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint.
    ///
    /// An `http://host:port` endpoint is resolved through
    /// [`discovery`](crate::discovery) before connecting.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the per-command deadline.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_command_timeout(timeout);
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the listener buffering policy.
    #[inline]
    #[must_use]
    pub fn listener_buffer(mut self, buffer: ListenerBuffer) -> Self {
        self.options = self.options.with_listener_buffer(buffer);
        self
    }

    /// Sets the event registry.
    #[inline]
    #[must_use]
    pub fn event_registry(mut self, registry: EventRegistry) -> Self {
        self.options = self.options.with_event_registry(registry);
        self
    }

    /// Resolves the endpoint, opens the transport and starts the reader loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set, the scheme is unsupported
    ///   or the options are invalid
    /// - discovery errors for `http://` endpoints
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] from the handshake
    pub async fn connect(self) -> Result<Connection> {
        self.options.validate()?;
        let ws_url = self.resolve_endpoint().await?;

        let (sink, source) = transport::connect(&ws_url, self.options.connect_timeout).await?;
        Connection::from_transport(sink, source, self.options)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionBuilder {
    /// Turns the configured endpoint into a WebSocket URL.
    async fn resolve_endpoint(&self) -> Result<String> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Connection::builder().endpoint(\"http://localhost:9222\")",
            )
        })?;

        let url = Url::parse(endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(endpoint.to_string()),
            "http" | "https" => {
                debug!(endpoint, "Resolving WebSocket URL via discovery");
                discovery::discover_url(&url).await
            }
            scheme => Err(Error::config(format!(
                "Unsupported endpoint scheme '{scheme}'; expected ws, wss, http or https"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ConnectionBuilder::new();
        assert!(builder.endpoint.is_none());
        assert!(builder.options.command_timeout.is_none());
    }

    #[test]
    fn test_endpoint_sets_value() {
        let builder = ConnectionBuilder::new().endpoint("ws://localhost:9222/devtools/browser/x");
        assert_eq!(
            builder.endpoint.as_deref(),
            Some("ws://localhost:9222/devtools/browser/x")
        );
    }

    #[test]
    fn test_options_chain() {
        let builder = ConnectionBuilder::new()
            .command_timeout(Duration::from_secs(3))
            .listener_buffer(ListenerBuffer::Bounded(4));
        assert_eq!(builder.options.command_timeout, Some(Duration::from_secs(3)));
        assert_eq!(builder.options.listener_buffer, ListenerBuffer::Bounded(4));
    }

    #[tokio::test]
    async fn test_connect_fails_without_endpoint() {
        let err = ConnectionBuilder::new().connect().await.unwrap_err();
        assert!(err.to_string().contains("Endpoint"));
    }

    #[tokio::test]
    async fn test_ws_endpoint_passes_through() {
        let builder = ConnectionBuilder::new().endpoint("ws://127.0.0.1:1/devtools/browser/u");
        let url = builder.resolve_endpoint().await.expect("resolve");
        assert_eq!(url, "ws://127.0.0.1:1/devtools/browser/u");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let builder = ConnectionBuilder::new().endpoint("ftp://localhost:9222");
        assert!(matches!(
            builder.resolve_endpoint().await,
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let err = ConnectionBuilder::new()
            .endpoint("ws://127.0.0.1:1")
            .options(ConnectionOptions::new().with_max_pending(0))
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
