//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//! a [`SessionId`] cannot be passed where a [`TargetId`] is expected even
//! though both are opaque strings on the wire.
//!
//! | Type | Assigned by | Wire form |
//! |------|-------------|-----------|
//! | [`CommandId`] | Connection (monotonic) | integer |
//! | [`SubscriptionId`] | Connection (monotonic) | not sent |
//! | [`SessionId`] | Browser (`Target.attachToTarget`) | string |
//! | [`TargetId`] | Browser | string |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// CommandId
// ============================================================================

/// Identifier correlating a command with its response.
///
/// Unique per connection and never reused while the connection is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw command ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier of one event subscription (waiter or listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw subscription ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// IdAllocator
// ============================================================================

/// Monotonic counter handing out connection-local identifiers.
///
/// Starts at 1; `0` is never allocated.
#[derive(Debug)]
pub(crate) struct IdAllocator(AtomicU64);

impl IdAllocator {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    #[inline]
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// String Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier string.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Browser-assigned identifier of an attached session.
    ///
    /// Never changes once assigned; re-attaching yields a new one.
    SessionId
);

string_id!(
    /// Identifier of a debuggable target (tab, frame, worker).
    TargetId
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_command_id_serializes_as_integer() {
        let json = serde_json::to_string(&CommandId::new(42)).expect("serialize");
        assert_eq!(json, "42");
    }

    #[test]
    fn test_session_id_serializes_as_string() {
        let json = serde_json::to_string(&SessionId::from("ABC")).expect("serialize");
        assert_eq!(json, "\"ABC\"");

        let parsed: SessionId = serde_json::from_str("\"ABC\"").expect("parse");
        assert_eq!(parsed.as_str(), "ABC");
    }

    #[test]
    fn test_allocator_starts_at_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[test]
    fn test_allocator_unique_across_threads() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread") {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn test_display() {
        assert_eq!(TargetId::from("T1").to_string(), "T1");
        assert_eq!(SubscriptionId::new(3).to_string(), "sub-3");
    }
}
