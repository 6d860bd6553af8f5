//! Event subscription tables and fan-out.
//!
//! Subscriptions are grouped by scope: `None` is the browser (root) scope,
//! `Some(session_id)` a session scope. The reader loop owns the router and
//! is the only task that mutates it.
//!
//! Delivery never waits on a subscriber. A one-shot waiter is removed on
//! its first match; a listener whose receiver is gone is removed the next
//! time it would have received an event.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::identifiers::{SessionId, SubscriptionId};
use crate::protocol::{Event, EventRegistry, RawEvent};

// ============================================================================
// ListenerSender
// ============================================================================

/// Producer side of a listener stream.
pub(crate) enum ListenerSender {
    /// Never full.
    Unbounded(mpsc::UnboundedSender<Event>),
    /// Drops events while the buffer is full.
    Bounded(mpsc::Sender<Event>),
}

impl ListenerSender {
    /// Hands `event` to the listener. Returns `false` once the receiver is gone.
    fn deliver(&self, id: SubscriptionId, event: Event) -> bool {
        match self {
            Self::Unbounded(tx) => tx.send(event).is_ok(),
            Self::Bounded(tx) => match tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    warn!(%id, method = %event.method, "Listener buffer full; dropping event");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            },
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// How matched events reach the subscriber.
pub(crate) enum Delivery {
    /// Resolves once, then the subscription is removed.
    Once(Option<oneshot::Sender<Event>>),
    /// Receives every match until unsubscribed.
    Stream(ListenerSender),
}

/// One registered waiter or listener.
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) scope: Option<SessionId>,
    pub(crate) methods: Vec<String>,
    pub(crate) delivery: Delivery,
}

impl Subscription {
    #[inline]
    fn matches(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Delivers a copy of `event`. Returns whether the subscription stays.
    fn deliver(&mut self, event: &Event) -> bool {
        match &mut self.delivery {
            Delivery::Once(slot) => {
                if let Some(tx) = slot.take()
                    && tx.send(event.clone()).is_err()
                {
                    trace!(id = %self.id, "Waiter gone before delivery");
                }
                false
            }
            Delivery::Stream(tx) => tx.deliver(self.id, event.clone()),
        }
    }
}

// ============================================================================
// EventRouter
// ============================================================================

/// Subscription tables keyed by scope.
pub(crate) struct EventRouter {
    registry: EventRegistry,
    scopes: FxHashMap<Option<SessionId>, Vec<Subscription>>,
    index: FxHashMap<SubscriptionId, Option<SessionId>>,
}

impl EventRouter {
    pub(crate) fn new(registry: EventRegistry) -> Self {
        Self {
            registry,
            scopes: FxHashMap::default(),
            index: FxHashMap::default(),
        }
    }

    /// Installs a subscription.
    pub(crate) fn subscribe(&mut self, subscription: Subscription) {
        trace!(
            id = %subscription.id,
            scope = ?subscription.scope,
            methods = ?subscription.methods,
            "Subscription installed"
        );
        self.index
            .insert(subscription.id, subscription.scope.clone());
        self.scopes
            .entry(subscription.scope.clone())
            .or_default()
            .push(subscription);
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(scope) = self.index.remove(&id) else {
            return false;
        };

        if let Some(subscriptions) = self.scopes.get_mut(&scope) {
            subscriptions.retain(|s| s.id != id);
            if subscriptions.is_empty() {
                self.scopes.remove(&scope);
            }
        }

        trace!(%id, "Subscription removed");
        true
    }

    /// Fans a raw event out to every matching subscription in its scope.
    ///
    /// Returns the number of subscriptions that received it. Unregistered
    /// methods and undecodable payloads are dropped.
    pub(crate) fn dispatch(&mut self, raw: RawEvent) -> usize {
        if !self.registry.contains(&raw.method) {
            trace!(method = %raw.method, "Dropping unregistered event");
            return 0;
        }

        let Some(subscriptions) = self.scopes.get_mut(&raw.session_id) else {
            return 0;
        };
        if !subscriptions.iter().any(|s| s.matches(&raw.method)) {
            return 0;
        }

        let event = match self.registry.decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable event");
                return 0;
            }
        };

        let index = &mut self.index;
        let mut delivered = 0;
        subscriptions.retain_mut(|subscription| {
            if !subscription.matches(&event.method) {
                return true;
            }
            delivered += 1;
            let keep = subscription.deliver(&event);
            if !keep {
                index.remove(&subscription.id);
            }
            keep
        });

        if subscriptions.is_empty() {
            self.scopes.remove(&event.session_id);
        }

        delivered
    }

    /// Drops every subscription in `scope`, ending their streams.
    pub(crate) fn close_scope(&mut self, scope: &Option<SessionId>) -> usize {
        let Some(subscriptions) = self.scopes.remove(scope) else {
            return 0;
        };
        for subscription in &subscriptions {
            self.index.remove(&subscription.id);
        }
        debug!(?scope, count = subscriptions.len(), "Closed subscription scope");
        subscriptions.len()
    }

    /// Drops every subscription.
    pub(crate) fn close_all(&mut self) -> usize {
        let count = self.index.len();
        self.scopes.clear();
        self.index.clear();
        count
    }

    /// Number of live subscriptions.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
