//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Target selection

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use cdp_mux::{Connection, Error, Result, TargetId};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the debugging port.
pub const PORT_ENV: &str = "CHROME_DEBUG_PORT";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub positional: Vec<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            positional: args.into_iter().filter(|a| !a.starts_with("--")).collect(),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug { "cdp_mux=debug" } else { "cdp_mux=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

/// Debugging endpoint from `CHROME_DEBUG_PORT` (default 9222).
pub fn http_endpoint() -> String {
    let port = std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(cdp_mux::discovery::DEFAULT_DEBUG_PORT);
    format!("http://localhost:{port}")
}

/// Picks the first page nobody is attached to.
pub async fn free_page(connection: &Connection) -> Result<TargetId> {
    connection
        .get_targets()
        .await?
        .into_iter()
        .find(|t| t.is_free_page())
        .map(|t| t.target_id)
        .ok_or_else(|| Error::protocol("No free page target"))
}
