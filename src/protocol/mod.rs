//! DevTools protocol message types.
//!
//! This module defines the JSON frames exchanged with the browser and the
//! small command/event catalog the rest of the crate consumes.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Browser | Command with `id` |
//! | `Response` | Browser → Client | `result` or `error` for an `id` |
//! | `Event` | Browser → Client | Notification, optionally session-tagged |
//!
//! # Command Naming
//!
//! Commands and events follow `Domain.methodName` format:
//!
//! - `Target.attachToTarget`
//! - `Page.navigate`
//! - `Network.requestWillBeSent`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by domain |
//! | `event` | Event types and the decoder registry |
//! | `request` | Request, Response and inbound classification |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    AttachResult, BrowserCommand, BrowserVersion, Command, CreateTargetResult, DomCommand,
    GetTargetsResult, NetworkCommand, PageCommand, RawCommand, RuntimeCommand, TargetCommand,
    TargetInfo,
};
pub use event::{Event, EventDecoder, EventRegistry, ParsedEvent, RawEvent, method};
pub use request::{Inbound, Request, Response, ResponseError};
