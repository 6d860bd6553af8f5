//! Multiplexed connection.
//!
//! One [`Connection`] owns one transport and one background reader loop.
//! Every command, event and session of the browser flows through it.
//!
//! # Architecture
//!
//! ```text
//!  caller tasks                     reader loop (one task)
//!  ────────────                     ──────────────────────
//!  issue()      ── LoopCommand ──►  PendingReplies ──► FrameSink
//!  wait_for()   ── LoopCommand ──►  EventRouter
//!  listen()     ── LoopCommand ──►  EventRouter
//!                                        ▲
//!                                   FrameSource
//! ```
//!
//! Caller tasks never touch the tables; they enqueue a `LoopCommand` and
//! await a channel.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ConnectionBuilder`] |
//! | `options` | [`ConnectionOptions`], [`ListenerBuffer`] |
//! | `core` | [`Connection`] handle, command issuing |
//! | `dispatcher` | Pending-reply table |
//! | `router` | Subscription tables and fan-out |
//! | `reader` | The reader loop |
//! | `subscription` | [`EventWaiter`], [`EventStream`] |
//! | `browser` | Browser-scope helpers |

// ============================================================================
// Submodules
// ============================================================================

mod browser;
mod builder;
mod core;
mod dispatcher;
mod options;
mod reader;
mod router;
mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use self::core::Connection;
pub use options::{ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING, ListenerBuffer};
pub use subscription::{EventStream, EventWaiter};
