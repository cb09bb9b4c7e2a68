//! Cleanup registry
//!
//! Every action registered here runs at most once: on global teardown, when
//! its context is destroyed, or never if its handle is cancelled first.
//! Teardown is LIFO. An action is taken out of the registry before it runs,
//! so re-entrant teardown from inside an action cannot invoke it twice.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::context::{ContextEvent, ContextId, ContextNotifier, SubscriptionId, WeakNotifier};

/// A cleanup closure. Errors and panics are logged and discarded.
pub type UnloadAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnloadId(u64);

impl std::fmt::Display for UnloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    id: UnloadId,
    context: Option<ContextId>,
    action: UnloadAction,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Registration order
    entries: Vec<Entry>,
    /// Context -> its entries, in registration order
    by_context: HashMap<ContextId, Vec<UnloadId>>,
}

impl Inner {
    fn take(&mut self, id: UnloadId) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(index);
        self.unindex(&entry);
        Some(entry)
    }

    fn take_last(&mut self) -> Option<Entry> {
        let entry = self.entries.pop()?;
        self.unindex(&entry);
        Some(entry)
    }

    fn take_last_for(&mut self, context: &ContextId) -> Option<Entry> {
        let id = self.by_context.get(context)?.last().copied()?;
        self.take(id)
    }

    fn unindex(&mut self, entry: &Entry) {
        let Some(context) = &entry.context else {
            return;
        };
        if let Some(ids) = self.by_context.get_mut(context) {
            ids.retain(|id| *id != entry.id);
            if ids.is_empty() {
                self.by_context.remove(context);
            }
        }
    }
}

/// Explicit registry instance, created at startup and handed to every
/// component that needs to clean up after itself. Cloning shares it.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action, optionally scoped to a context so that it
    /// also fires when that context is destroyed.
    pub fn register<F>(&self, action: F, context: Option<&ContextId>) -> UnloadHandle
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = UnloadId(inner.next_id);

        if let Some(context) = context {
            inner.by_context.entry(context.clone()).or_default().push(id);
        }
        inner.entries.push(Entry {
            id,
            context: context.cloned(),
            action: Box::new(action),
        });

        tracing::trace!(unload_id = %id, context = ?context.map(ContextId::as_str), "Registered unloader");

        UnloadHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe `listener` to context notifications and register its
    /// removal. The returned handle removes both at once.
    pub fn register_listener<F>(
        &self,
        notifier: &ContextNotifier,
        context: Option<&ContextId>,
        listener: F,
    ) -> ListenerHandle
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        let subscription = notifier.subscribe(listener);
        let weak = notifier.downgrade();

        let target = weak.clone();
        let unloader = self.register(
            move || {
                if let Some(notifier) = target.upgrade() {
                    notifier.unsubscribe(subscription);
                }
                Ok(())
            },
            context,
        );

        ListenerHandle {
            subscription,
            notifier: weak,
            unloader,
        }
    }

    /// Run every registered action, newest first, and leave the registry
    /// empty. Actions registered while this runs are run as well.
    ///
    /// Returns the number of actions executed.
    pub fn unload(&self) -> usize {
        let mut executed = 0;
        loop {
            let next = self.inner.lock().take_last();
            match next {
                Some(entry) => {
                    run_entry(entry);
                    executed += 1;
                }
                None => break,
            }
        }

        if executed > 0 {
            tracing::info!(executed, "Unloaded registry");
        }
        executed
    }

    /// Run the actions scoped to a destroyed context, newest first. They are
    /// removed from the registry and will not run again on `unload`.
    pub fn context_destroyed(&self, context: &ContextId) -> usize {
        let mut executed = 0;
        loop {
            let next = self.inner.lock().take_last_for(context);
            match next {
                Some(entry) => {
                    run_entry(entry);
                    executed += 1;
                }
                None => break,
            }
        }

        tracing::debug!(context = %context, executed, "Context destroyed");
        executed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of actions still scoped to `context`.
    pub fn scoped_len(&self, context: &ContextId) -> usize {
        self.inner
            .lock()
            .by_context
            .get(context)
            .map_or(0, Vec::len)
    }
}

fn run_entry(entry: Entry) {
    let Entry {
        id,
        context,
        action,
    } = entry;

    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(unload_id = %id, context = ?context, error = %e, "Unloader failed");
        }
        Err(_) => {
            tracing::warn!(unload_id = %id, context = ?context, "Unloader panicked");
        }
    }
}

/// Handle to a registered action. Dropping it leaves the action registered.
#[derive(Clone)]
pub struct UnloadHandle {
    id: UnloadId,
    registry: Weak<Mutex<Inner>>,
}

impl UnloadHandle {
    pub fn id(&self) -> UnloadId {
        self.id
    }

    /// Remove the action without running it. Returns false if it already
    /// ran or was cancelled.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let removed = inner.lock().take(self.id);
        removed.is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.lock().entries.iter().any(|e| e.id == self.id))
    }
}

/// Handle to a listener added through [`Registry::register_listener`].
#[derive(Clone)]
pub struct ListenerHandle {
    subscription: SubscriptionId,
    notifier: WeakNotifier,
    unloader: UnloadHandle,
}

impl ListenerHandle {
    /// Unsubscribe now and drop the pending unloader.
    pub fn remove(&self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(self.subscription);
        }
        self.unloader.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|n| n.is_subscribed(self.subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce() -> anyhow::Result<()> + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |n: u32| {
            let sink = Arc::clone(&sink);
            Box::new(move || {
                sink.lock().push(n);
                Ok(())
            }) as Box<dyn FnOnce() -> anyhow::Result<()> + Send>
        };
        (log, make)
    }

    #[test]
    fn test_unload_runs_in_reverse_order_once() {
        let registry = Registry::new();
        let (log, action) = recorder();

        for n in 1..=5 {
            let _ = registry.register(action(n), None);
        }

        assert_eq!(registry.unload(), 5);
        assert_eq!(*log.lock(), vec![5, 4, 3, 2, 1]);

        // Second teardown has nothing left
        assert_eq!(registry.unload(), 0);
        assert_eq!(log.lock().len(), 5);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unload_empty_is_noop() {
        let registry = Registry::new();
        assert_eq!(registry.unload(), 0);
    }

    #[test]
    fn test_cancelled_action_never_fires() {
        let registry = Registry::new();
        let (log, action) = recorder();

        let _ = registry.register(action(1), None);
        let handle = registry.register(action(2), None);
        let _ = registry.register(action(3), None);

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.is_registered());

        registry.unload();
        assert_eq!(*log.lock(), vec![3, 1]);
    }

    #[test]
    fn test_context_scoped_fires_once() {
        let registry = Registry::new();
        let (log, action) = recorder();
        let window: ContextId = "w1".into();

        let _ = registry.register(action(1), None);
        let _ = registry.register(action(2), Some(&window));
        let _ = registry.register(action(3), Some(&window));
        assert_eq!(registry.scoped_len(&window), 2);

        assert_eq!(registry.context_destroyed(&window), 2);
        assert_eq!(*log.lock(), vec![3, 2]);
        assert_eq!(registry.scoped_len(&window), 0);

        registry.unload();
        assert_eq!(*log.lock(), vec![3, 2, 1]);
    }

    #[test]
    fn test_context_scoped_runs_on_global_unload_when_context_survives() {
        let registry = Registry::new();
        let (log, action) = recorder();
        let window: ContextId = "w1".into();

        let _ = registry.register(action(1), Some(&window));
        registry.unload();
        assert_eq!(*log.lock(), vec![1]);

        // Destroying the window afterwards must not re-run it
        assert_eq!(registry.context_destroyed(&window), 0);
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn test_failures_do_not_stop_teardown() {
        let registry = Registry::new();
        let (log, action) = recorder();

        let _ = registry.register(action(1), None);
        let _ = registry.register(|| Err(anyhow::anyhow!("boom")), None);
        let _ = registry.register(|| panic!("cleanup panicked"), None);
        let _ = registry.register(action(4), None);

        assert_eq!(registry.unload(), 4);
        assert_eq!(*log.lock(), vec![4, 1]);
    }

    #[test]
    fn test_reentrant_unload_does_not_double_invoke() {
        let registry = Registry::new();
        let (log, action) = recorder();

        let _ = registry.register(action(1), None);
        let inner = registry.clone();
        let _ = registry.register(
            move || {
                inner.unload();
                Ok(())
            },
            None,
        );

        registry.unload();
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn test_action_can_cancel_a_later_one() {
        let registry = Registry::new();
        let (log, action) = recorder();

        let victim = registry.register(action(1), None);
        let _ = registry.register(
            move || {
                victim.cancel();
                Ok(())
            },
            None,
        );

        registry.unload();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_action_registered_during_unload_runs() {
        let registry = Registry::new();
        let (log, action) = recorder();

        let inner = registry.clone();
        let late = action(2);
        let _ = registry.register(action(1), None);
        let _ = registry.register(
            move || {
                let _ = inner.register(late, None);
                Ok(())
            },
            None,
        );

        assert_eq!(registry.unload(), 3);
        assert_eq!(*log.lock(), vec![2, 1]);
    }

    #[test]
    fn test_listener_handle_removes_subscription_and_unloader() {
        let registry = Registry::new();
        let notifier = ContextNotifier::new();

        let handle = registry.register_listener(&notifier, None, |_| {});
        assert!(handle.is_active());
        assert_eq!(registry.len(), 1);

        handle.remove();
        assert!(!handle.is_active());
        assert_eq!(notifier.subscriber_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_unsubscribed_on_unload() {
        let registry = Registry::new();
        let notifier = ContextNotifier::new();

        let handle = registry.register_listener(&notifier, Some(&"w1".into()), |_| {});
        registry.context_destroyed(&"w1".into());

        assert!(!handle.is_active());
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
