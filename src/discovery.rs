//! Debugger endpoint discovery.
//!
//! A browser started with `--remote-debugging-port` serves
//! `GET /json/version`, whose `webSocketDebuggerUrl` field is the browser
//! WebSocket endpoint.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> cdp_mux::Result<()> {
//! let ws_url = cdp_mux::discovery::discover("localhost", 9222).await?;
//! let connection = cdp_mux::Connection::connect(ws_url).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default debugging host.
pub const DEFAULT_DEBUG_HOST: &str = "localhost";

/// Default debugging port.
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Path of the version endpoint.
const VERSION_PATH: &str = "/json/version";

/// Field carrying the endpoint.
const DEBUGGER_URL_FIELD: &str = "webSocketDebuggerUrl";

// ============================================================================
// Discovery
// ============================================================================

/// Fetches the browser WebSocket endpoint from `http://{host}:{port}`.
///
/// One request, no retries, no caching.
///
/// # Errors
///
/// - [`Error::Http`] if the request fails
/// - [`Error::Json`] if the body is not JSON
/// - [`Error::Discovery`] if the body has no `webSocketDebuggerUrl`
pub async fn discover(host: &str, port: u16) -> Result<String> {
    let version_url = format!("http://{host}:{port}{VERSION_PATH}");
    fetch(&version_url).await
}

/// Fetches the endpoint from `localhost:9222`.
///
/// # Errors
///
/// See [`discover`].
pub async fn discover_default() -> Result<String> {
    discover(DEFAULT_DEBUG_HOST, DEFAULT_DEBUG_PORT).await
}

/// Fetches the endpoint from the version path of an `http(s)://` base URL.
///
/// # Errors
///
/// See [`discover`].
pub async fn discover_url(base: &Url) -> Result<String> {
    let version_url = base.join(VERSION_PATH)?;
    fetch(version_url.as_str()).await
}

/// Extracts `webSocketDebuggerUrl` from a version response body.
///
/// # Errors
///
/// - [`Error::Json`] if the body is not JSON
/// - [`Error::Discovery`] if the field is absent or not a string
pub fn parse_debugger_url(body: &str) -> Result<String> {
    let version: Value = serde_json::from_str(body)?;

    version
        .get(DEBUGGER_URL_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::discovery("No webSocketDebuggerUrl found"))
}

async fn fetch(version_url: &str) -> Result<String> {
    debug!(url = version_url, "Fetching browser version");

    let body = reqwest::get(version_url).await?.text().await?;
    let ws_url = parse_debugger_url(&body)?;

    debug!(ws_url = %ws_url, "Discovered debugger endpoint");
    Ok(ws_url)
}

// ============================================================================
// Tests
// ============================================================================
