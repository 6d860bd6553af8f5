//! Event message types and the event registry.
//!
//! Events are notifications the browser pushes without a matching command.
//! Each carries a `Domain.eventName` method and, for session-scoped events,
//! the originating `sessionId`.
//!
//! # Event Types
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Page` | `loadEventFired`, `domContentEventFired`, `frameNavigated` |
//! | `Network` | `requestWillBeSent`, `responseReceived`, `loadingFinished`, `loadingFailed` |
//! | `Target` | `attachedToTarget`, `detachedFromTarget`, `targetCreated`, `targetDestroyed` |
//!
//! Methods outside the [`EventRegistry`] are dropped by the router.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};

// ============================================================================
// Method Names
// ============================================================================

/// Event method names known to the default registry.
pub mod method {
    /// `Page.loadEventFired`
    pub const PAGE_LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
    /// `Page.domContentEventFired`
    pub const PAGE_DOM_CONTENT_EVENT_FIRED: &str = "Page.domContentEventFired";
    /// `Page.frameNavigated`
    pub const PAGE_FRAME_NAVIGATED: &str = "Page.frameNavigated";
    /// `Network.requestWillBeSent`
    pub const NETWORK_REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
    /// `Network.responseReceived`
    pub const NETWORK_RESPONSE_RECEIVED: &str = "Network.responseReceived";
    /// `Network.loadingFinished`
    pub const NETWORK_LOADING_FINISHED: &str = "Network.loadingFinished";
    /// `Network.loadingFailed`
    pub const NETWORK_LOADING_FAILED: &str = "Network.loadingFailed";
    /// `Target.attachedToTarget`
    pub const TARGET_ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";
    /// `Target.detachedFromTarget`
    pub const TARGET_DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";
    /// `Target.targetCreated`
    pub const TARGET_TARGET_CREATED: &str = "Target.targetCreated";
    /// `Target.targetDestroyed`
    pub const TARGET_TARGET_DESTROYED: &str = "Target.targetDestroyed";
}

// ============================================================================
// RawEvent
// ============================================================================

/// An event frame as received, before decoding.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Event name in `Domain.eventName` format.
    pub method: String,
    /// Event-specific data.
    pub params: Value,
    /// Originating session; `None` for browser scope.
    pub session_id: Option<SessionId>,
}

// ============================================================================
// Event
// ============================================================================

/// A decoded event as delivered to subscribers.
///
/// `payload` is the typed view of the fields the catalog knows about;
/// `params` is the full object exactly as the browser sent it. Every
/// matching subscriber receives its own clone.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,
    /// Originating session; `None` for browser scope.
    pub session_id: Option<SessionId>,
    /// Event params, unmodified.
    pub params: Value,
    /// Typed payload.
    pub payload: ParsedEvent,
}

impl Event {
    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// assert_eq!(event.domain(), "Page"); // "Page.loadEventFired"
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event payloads, keyed by method.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Page `load` fired.
    PageLoadEventFired {
        /// Monotonic timestamp.
        timestamp: f64,
    },

    /// `DOMContentLoaded` fired.
    PageDomContentEventFired {
        /// Monotonic timestamp.
        timestamp: f64,
    },

    /// A frame committed a navigation.
    PageFrameNavigated {
        /// Frame ID.
        frame_id: String,
        /// New URL.
        url: String,
    },

    /// Request about to be sent.
    NetworkRequestWillBeSent {
        /// Request ID.
        request_id: String,
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
    },

    /// Response headers received.
    NetworkResponseReceived {
        /// Request ID.
        request_id: String,
        /// Response URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Request finished loading.
    NetworkLoadingFinished {
        /// Request ID.
        request_id: String,
    },

    /// Request failed.
    NetworkLoadingFailed {
        /// Request ID.
        request_id: String,
        /// Failure description.
        error_text: String,
    },

    /// A session was attached (auto-attach or another client).
    TargetAttachedToTarget {
        /// New session.
        session_id: SessionId,
        /// Attached target.
        target_id: TargetId,
    },

    /// A session was detached.
    TargetDetachedFromTarget {
        /// Detached session.
        session_id: SessionId,
    },

    /// A target appeared.
    TargetCreated {
        /// Target ID.
        target_id: TargetId,
        /// Target type.
        target_type: String,
        /// URL.
        url: String,
    },

    /// A target went away.
    TargetDestroyed {
        /// Target ID.
        target_id: TargetId,
    },

    /// Registered pass-through event with untyped params.
    Other {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Decoder turning raw params into a [`ParsedEvent`].
///
/// Receives the method so one decoder can serve several events.
pub type EventDecoder = fn(&str, &Value) -> Result<ParsedEvent>;

/// Maps event methods to their decoders.
///
/// [`EventRegistry::default`] knows every [`ParsedEvent`] variant.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    decoders: FxHashMap<String, EventDecoder>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(method::PAGE_LOAD_EVENT_FIRED, decode_page)
            .register(method::PAGE_DOM_CONTENT_EVENT_FIRED, decode_page)
            .register(method::PAGE_FRAME_NAVIGATED, decode_page)
            .register(method::NETWORK_REQUEST_WILL_BE_SENT, decode_network)
            .register(method::NETWORK_RESPONSE_RECEIVED, decode_network)
            .register(method::NETWORK_LOADING_FINISHED, decode_network)
            .register(method::NETWORK_LOADING_FAILED, decode_network)
            .register(method::TARGET_ATTACHED_TO_TARGET, decode_target)
            .register(method::TARGET_DETACHED_FROM_TARGET, decode_target)
            .register(method::TARGET_TARGET_CREATED, decode_target)
            .register(method::TARGET_TARGET_DESTROYED, decode_target);
        registry
    }
}

impl EventRegistry {
    /// Creates a registry that knows no events.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: FxHashMap::default(),
        }
    }

    /// Registers (or replaces) the decoder for `method`.
    pub fn register(&mut self, method: impl Into<String>, decoder: EventDecoder) -> &mut Self {
        self.decoders.insert(method.into(), decoder);
        self
    }

    /// Registers `method` to be delivered as [`ParsedEvent::Other`].
    pub fn register_passthrough(&mut self, method: impl Into<String>) -> &mut Self {
        self.register(method, decode_passthrough)
    }

    /// Returns `true` if `method` has a decoder.
    #[inline]
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.decoders.contains_key(method)
    }

    /// Decodes a raw event.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the method is unregistered or a required
    ///   field is missing
    pub fn decode(&self, raw: RawEvent) -> Result<Event> {
        let decoder = self
            .decoders
            .get(raw.method.as_str())
            .ok_or_else(|| Error::protocol(format!("Unregistered event: {}", raw.method)))?;

        let payload = decoder(&raw.method, &raw.params)?;

        Ok(Event {
            method: raw.method,
            session_id: raw.session_id,
            params: raw.params,
            payload,
        })
    }
}

// ============================================================================
// Decoders
// ============================================================================

fn decode_passthrough(method: &str, params: &Value) -> Result<ParsedEvent> {
    Ok(ParsedEvent::Other {
        method: method.to_string(),
        params: params.clone(),
    })
}

fn decode_page(name: &str, params: &Value) -> Result<ParsedEvent> {
    let params = Params(params);
    match name {
        method::PAGE_LOAD_EVENT_FIRED => Ok(ParsedEvent::PageLoadEventFired {
            timestamp: params.get_f64("timestamp"),
        }),
        method::PAGE_DOM_CONTENT_EVENT_FIRED => Ok(ParsedEvent::PageDomContentEventFired {
            timestamp: params.get_f64("timestamp"),
        }),
        method::PAGE_FRAME_NAVIGATED => {
            let frame = params.nested("frame");
            Ok(ParsedEvent::PageFrameNavigated {
                frame_id: frame.require_string("id")?,
                url: frame.get_string("url"),
            })
        }
        other => decode_passthrough(other, params.0),
    }
}

fn decode_network(name: &str, params: &Value) -> Result<ParsedEvent> {
    let params = Params(params);
    let request_id = params.require_string("requestId")?;
    match name {
        method::NETWORK_REQUEST_WILL_BE_SENT => {
            let request = params.nested("request");
            Ok(ParsedEvent::NetworkRequestWillBeSent {
                request_id,
                method: request.get_string_or("method", "GET"),
                url: request.get_string("url"),
            })
        }
        method::NETWORK_RESPONSE_RECEIVED => {
            let response = params.nested("response");
            Ok(ParsedEvent::NetworkResponseReceived {
                request_id,
                url: response.get_string("url"),
                status: response.get_u16("status"),
            })
        }
        method::NETWORK_LOADING_FINISHED => Ok(ParsedEvent::NetworkLoadingFinished { request_id }),
        method::NETWORK_LOADING_FAILED => Ok(ParsedEvent::NetworkLoadingFailed {
            request_id,
            error_text: params.get_string("errorText"),
        }),
        other => decode_passthrough(other, params.0),
    }
}

fn decode_target(name: &str, params: &Value) -> Result<ParsedEvent> {
    let params = Params(params);
    match name {
        method::TARGET_ATTACHED_TO_TARGET => Ok(ParsedEvent::TargetAttachedToTarget {
            session_id: params.require_string("sessionId")?.into(),
            target_id: params.nested("targetInfo").require_string("targetId")?.into(),
        }),
        method::TARGET_DETACHED_FROM_TARGET => Ok(ParsedEvent::TargetDetachedFromTarget {
            session_id: params.require_string("sessionId")?.into(),
        }),
        method::TARGET_TARGET_CREATED => {
            let info = params.nested("targetInfo");
            Ok(ParsedEvent::TargetCreated {
                target_id: info.require_string("targetId")?.into(),
                target_type: info.get_string("type"),
                url: info.get_string("url"),
            })
        }
        method::TARGET_TARGET_DESTROYED => Ok(ParsedEvent::TargetDestroyed {
            target_id: params.require_string("targetId")?.into(),
        }),
        other => decode_passthrough(other, params.0),
    }
}

// ============================================================================
// Params Helpers
// ============================================================================

/// Lenient accessors over an event's params object.
#[derive(Clone, Copy)]
struct Params<'a>(&'a Value);

impl<'a> Params<'a> {
    #[inline]
    fn nested(&self, key: &str) -> Params<'a> {
        Params(self.0.get(key).unwrap_or(&Value::Null))
    }

    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.get_string_or(key, "")
    }

    #[inline]
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    fn require_string(&self, key: &str) -> Result<String> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::protocol(format!("event missing required field '{key}'")))
    }

    #[inline]
    fn get_f64(&self, key: &str) -> f64 {
        self.0.get(key).and_then(|v| v.as_f64()).unwrap_or_default()
    }

    #[inline]
    fn get_u16(&self, key: &str) -> u16 {
        self.0
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
