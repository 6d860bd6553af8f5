//! Sessions: attached targets sharing one connection.
//!
//! # Lifecycle
//!
//! ```text
//! Connection::attach ──► Session (Attached)
//!                           │
//!        detach / guard drop / browser detach / connection close
//!                           ▼
//!                    Session (Detached)
//! ```
//!
//! Detach is idempotent and always releases local state: the registry
//! entry, the session's subscriptions and its usability.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Session`] handle, [`SessionState`] |
//! | `registry` | Live-session table |
//! | `lifecycle` | Attach, detach, scoped use |
//! | `guard` | [`SessionGuard`] |

// ============================================================================
// Submodules
// ============================================================================

mod core;
mod guard;
mod lifecycle;
mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Session, SessionState};
pub use guard::SessionGuard;

pub(crate) use registry::SessionRegistry;
