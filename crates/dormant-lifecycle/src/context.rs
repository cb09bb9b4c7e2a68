//! Host contexts (windows) and their lifecycle notifications

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Opaque identity of a host context, e.g. a browser window label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Lifecycle notification for a context: appears, becomes ready, destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    Created(ContextId),
    Ready(ContextId),
    Destroyed(ContextId),
}

impl ContextEvent {
    pub fn context(&self) -> &ContextId {
        match self {
            ContextEvent::Created(id) | ContextEvent::Ready(id) | ContextEvent::Destroyed(id) => id,
        }
    }
}

/// Read-only view of the contexts the host currently has.
pub trait ContextHost: Send + Sync {
    /// Every context that exists right now, in host order.
    fn contexts(&self) -> Vec<ContextId>;

    /// Whether the context finished its initial load.
    fn is_ready(&self, context: &ContextId) -> bool;

    /// The context's type (e.g. `navigator:browser`), if it can be determined yet.
    fn kind(&self, context: &ContextId) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&ContextEvent) + Send + Sync>;

#[derive(Default)]
struct NotifierInner {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

/// Fan-out of context notifications to subscribers.
///
/// Subscribers are invoked outside the internal lock, so a subscriber may
/// subscribe or unsubscribe (itself included) while being notified. A
/// subscriber removed during a dispatch is not called for the rest of it.
#[derive(Clone, Default)]
pub struct ContextNotifier {
    inner: Arc<Mutex<NotifierInner>>,
}

impl ContextNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push((id, Arc::new(subscriber)));
        id
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let index = inner.subscribers.iter().position(|(sid, _)| *sid == id);
            index.map(|i| inner.subscribers.remove(i))
        };
        removed.is_some()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.lock().subscribers.iter().any(|(sid, _)| *sid == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn notify(&self, event: &ContextEvent) {
        let snapshot: Vec<(SubscriptionId, Subscriber)> = self
            .inner
            .lock()
            .subscribers
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();

        tracing::trace!(context = %event.context(), ?event, "Context notification");

        for (id, subscriber) in snapshot {
            if self.is_subscribed(id) {
                subscriber(event);
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakNotifier {
        WeakNotifier(Arc::downgrade(&self.inner))
    }
}

#[derive(Clone)]
pub(crate) struct WeakNotifier(Weak<Mutex<NotifierInner>>);

impl WeakNotifier {
    pub(crate) fn upgrade(&self) -> Option<ContextNotifier> {
        self.0.upgrade().map(|inner| ContextNotifier { inner })
    }
}
