//! Request, Response and inbound envelope types.
//!
//! Defines the wire format for commands sent to the browser and for every
//! frame received from it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId};

use super::Command;
use super::event::RawEvent;

// ============================================================================
// Request
// ============================================================================

/// A command request from client to browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Domain.command",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: CommandId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,

    /// Target session; absent for browser-scope commands.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Request {
    /// Creates a new request.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, session_id: Option<SessionId>, command: Command) -> Self {
        Self {
            id,
            command,
            session_id,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from browser to client.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result data (if success).
    pub result: Option<Value>,

    /// Error payload (if error).
    pub error: Option<ResponseError>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the browser rejected the command.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::command(error.code, error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object of a rejected command.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Optional extra detail.
    #[serde(default)]
    pub data: Option<Value>,
}

// ============================================================================
// Inbound
// ============================================================================

/// Every frame the browser sends, before classification.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    id: Option<CommandId>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ResponseError>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<SessionId>,
}

/// A classified inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// Reply to a command we sent.
    Response(Response),
    /// Unsolicited notification.
    Event(RawEvent),
}

impl Inbound {
    /// Parses and classifies one text frame.
    ///
    /// Frames carrying an `id` are responses; frames carrying only a
    /// `method` are events.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not a JSON object
    /// - [`Error::Protocol`] if it has neither `id` nor `method`
    pub fn parse(text: &str) -> Result<Self> {
        let message: InboundMessage = serde_json::from_str(text)?;

        if let Some(id) = message.id {
            return Ok(Self::Response(Response {
                id,
                result: message.result,
                error: message.error,
            }));
        }

        match message.method {
            Some(method) => Ok(Self::Event(RawEvent {
                method,
                params: message.params.unwrap_or(Value::Null),
                session_id: message.session_id,
            })),
            None => Err(Error::protocol("frame has neither id nor method")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
