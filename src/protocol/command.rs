//! Command definitions organized by protocol domain.
//!
//! Commands follow the `Domain.methodName` format.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Target` | Discovery, attach/detach, create/close |
//! | `Page` | Enable, navigation, reload |
//! | `Network` | Enable/disable |
//! | `DOM` | Document, query, outer HTML |
//! | `Runtime` | Expression evaluation |
//! | `Browser` | Version, close |
//!
//! Anything not listed here can still be sent through [`Command::raw`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{SessionId, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
/// Each inner enum serializes to `{"method": ..., "params": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Target domain commands.
    Target(TargetCommand),
    /// Page domain commands.
    Page(PageCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// DOM domain commands.
    Dom(DomCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Browser domain commands.
    Browser(BrowserCommand),
    /// Any method by name with opaque params.
    Raw(RawCommand),
}

impl Command {
    /// Creates a command for an arbitrary method.
    #[inline]
    #[must_use]
    pub fn raw(method: impl Into<String>, params: Value) -> Self {
        Self::Raw(RawCommand {
            method: method.into(),
            params,
        })
    }

    /// Returns the wire method name (`Domain.method`).
    #[must_use]
    pub fn method(&self) -> String {
        if let Self::Raw(raw) = self {
            return raw.method.clone();
        }

        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default()
    }
}

macro_rules! impl_from_domain {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Command {
                fn from(command: $ty) -> Self {
                    Self::$variant(command)
                }
            }
        )*
    };
}

impl_from_domain! {
    Target => TargetCommand,
    Page => PageCommand,
    Network => NetworkCommand,
    Dom => DomCommand,
    Runtime => RuntimeCommand,
    Browser => BrowserCommand,
    Raw => RawCommand,
}

// ============================================================================
// Raw Command
// ============================================================================

/// A command addressed by method name with caller-built params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommand {
    /// Method in `Domain.method` format.
    pub method: String,
    /// Params object.
    pub params: Value,
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for discovery and session management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// List available targets.
    #[serde(rename = "Target.getTargets")]
    GetTargets {},

    /// Attach to a target, creating a session.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Use flat session mode (sessionId on each message).
        flatten: bool,
    },

    /// Detach a session.
    #[serde(rename = "Target.detachFromTarget")]
    DetachFromTarget {
        /// Session to detach.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Open a new page target.
    #[serde(rename = "Target.createTarget")]
    CreateTarget {
        /// Initial URL.
        url: String,
    },

    /// Close a target.
    #[serde(rename = "Target.closeTarget")]
    CloseTarget {
        /// Target to close.
        #[serde(rename = "targetId")]
        target_id: TargetId,
    },

    /// Toggle `targetCreated`/`targetDestroyed` notifications.
    #[serde(rename = "Target.setDiscoverTargets")]
    SetDiscoverTargets {
        /// Whether to discover targets.
        discover: bool,
    },
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page events.
    #[serde(rename = "Page.enable")]
    Enable {},

    /// Navigate to URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Reload current page.
    #[serde(rename = "Page.reload")]
    Reload {
        /// Bypass the cache.
        #[serde(rename = "ignoreCache", skip_serializing_if = "Option::is_none")]
        ignore_cache: Option<bool>,
    },
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network events.
    #[serde(rename = "Network.enable")]
    Enable {},

    /// Disable network events.
    #[serde(rename = "Network.disable")]
    Disable {},
}

// ============================================================================
// DOM Commands
// ============================================================================

/// DOM domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum DomCommand {
    /// Get the root document node.
    #[serde(rename = "DOM.getDocument")]
    GetDocument {},

    /// Find the first node matching a selector.
    #[serde(rename = "DOM.querySelector")]
    QuerySelector {
        /// Node to search under.
        #[serde(rename = "nodeId")]
        node_id: i64,
        /// CSS selector.
        selector: String,
    },

    /// Get a node's outer HTML.
    #[serde(rename = "DOM.getOuterHTML")]
    GetOuterHtml {
        /// Node ID.
        #[serde(rename = "nodeId")]
        node_id: i64,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate an expression in the page.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// JavaScript expression.
        expression: String,
        /// Return the value instead of a remote object reference.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
    },
}

// ============================================================================
// Browser Commands
// ============================================================================

/// Browser domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowserCommand {
    /// Get browser version information.
    #[serde(rename = "Browser.getVersion")]
    GetVersion {},

    /// Close the browser gracefully.
    #[serde(rename = "Browser.close")]
    Close {},
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of `Target.attachToTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResult {
    /// Newly assigned session.
    pub session_id: SessionId,
}

/// Result of `Target.createTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
    /// Created target.
    pub target_id: TargetId,
}

/// Result of `Target.getTargets`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    /// All known targets.
    pub target_infos: Vec<TargetInfo>,
}

/// Description of one debuggable target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID.
    pub target_id: TargetId,
    /// Target type (`page`, `iframe`, `worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Whether a client is attached.
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Returns `true` for a regular page that nobody is attached to.
    #[inline]
    #[must_use]
    pub fn is_free_page(&self) -> bool {
        self.target_type == "page" && !self.url.starts_with("devtools://") && !self.attached
    }
}

/// Result of `Browser.getVersion`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVersion {
    /// Protocol version.
    pub protocol_version: String,
    /// Product name and version.
    pub product: String,
    /// User agent.
    #[serde(default)]
    pub user_agent: String,
    /// JavaScript engine version.
    #[serde(default)]
    pub js_version: String,
}

// ============================================================================
// Tests
// ============================================================================
