//! Context watcher
//!
//! Runs a callback once for every existing and future context that matches
//! a predicate, after that context has finished loading.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::{ContextEvent, ContextHost, ContextId, ContextNotifier};
use crate::registry::{ListenerHandle, Registry};

type Predicate = Box<dyn Fn(&dyn ContextHost, &ContextId) -> bool + Send + Sync>;
type ReadyCallback = Box<dyn Fn(&ContextId) -> anyhow::Result<()> + Send + Sync>;

/// Predicate matching contexts whose host-reported kind equals `kind`.
pub fn of_kind(
    kind: impl Into<String>,
) -> impl Fn(&dyn ContextHost, &ContextId) -> bool + Send + Sync + 'static {
    let kind = kind.into();
    move |host: &dyn ContextHost, context: &ContextId| {
        host.kind(context).as_deref() == Some(kind.as_str())
    }
}

#[derive(Default)]
struct WatchState {
    /// Contexts waiting for their one-shot ready notification
    awaiting_ready: HashSet<ContextId>,
    /// Contexts `on_ready` already ran for
    fired: HashSet<ContextId>,
}

struct Shared {
    host: Arc<dyn ContextHost>,
    predicate: Predicate,
    on_ready: ReadyCallback,
    state: Mutex<WatchState>,
}

impl Shared {
    fn schedule(&self, context: &ContextId) {
        if self.host.is_ready(context) {
            self.fire(context);
        } else {
            self.state.lock().awaiting_ready.insert(context.clone());
        }
    }

    fn handle(&self, event: &ContextEvent) {
        match event {
            ContextEvent::Created(context) => self.schedule(context),
            ContextEvent::Ready(context) => {
                let waiting = self.state.lock().awaiting_ready.remove(context);
                if waiting {
                    self.fire(context);
                }
            }
            ContextEvent::Destroyed(context) => {
                let mut state = self.state.lock();
                state.awaiting_ready.remove(context);
                state.fired.remove(context);
            }
        }
    }

    fn fire(&self, context: &ContextId) {
        // The kind may only be known once the context is ready, so the
        // predicate is checked here rather than on creation.
        if !(self.predicate)(self.host.as_ref(), context) {
            tracing::trace!(context = %context, "Context does not match watch predicate");
            return;
        }
        if !self.state.lock().fired.insert(context.clone()) {
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| (self.on_ready)(context))) {
            Ok(Ok(())) => {
                tracing::debug!(context = %context, "Context ready callback ran");
            }
            Ok(Err(e)) => {
                tracing::warn!(context = %context, error = %e, "Context ready callback failed");
            }
            Err(_) => {
                tracing::warn!(context = %context, "Context ready callback panicked");
            }
        }
    }
}

/// A running watch. Stopped by global teardown or by [`ContextWatcher::stop`].
#[derive(Clone)]
pub struct ContextWatcher {
    shared: Arc<Shared>,
    listener: ListenerHandle,
}

impl ContextWatcher {
    /// Whether `on_ready` has run for this (still alive) context.
    pub fn has_fired(&self, context: &ContextId) -> bool {
        self.shared.state.lock().fired.contains(context)
    }

    /// Whether the watcher is waiting for this context to become ready.
    pub fn is_awaiting(&self, context: &ContextId) -> bool {
        self.shared.state.lock().awaiting_ready.contains(context)
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_active()
    }

    /// Stop watching for new contexts.
    pub fn stop(&self) {
        self.listener.remove();
    }
}

/// Invoke `on_ready` once for every existing and future context matching
/// `predicate`, once that context is ready.
///
/// The subscription to context notifications is registered with `registry`
/// so global teardown stops the watch. Errors and panics from `on_ready`
/// are logged and discarded.
pub fn watch<P, F>(
    registry: &Registry,
    notifier: &ContextNotifier,
    host: Arc<dyn ContextHost>,
    predicate: P,
    on_ready: F,
) -> ContextWatcher
where
    P: Fn(&dyn ContextHost, &ContextId) -> bool + Send + Sync + 'static,
    F: Fn(&ContextId) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let shared = Arc::new(Shared {
        host,
        predicate: Box::new(predicate),
        on_ready: Box::new(on_ready),
        state: Mutex::new(WatchState::default()),
    });

    let handler = Arc::clone(&shared);
    let listener = registry.register_listener(notifier, None, move |event| handler.handle(event));

    for context in shared.host.contexts() {
        shared.schedule(&context);
    }

    ContextWatcher { shared, listener }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeHost {
        windows: Mutex<Vec<ContextId>>,
        ready: Mutex<HashSet<ContextId>>,
        kinds: Mutex<HashMap<ContextId, String>>,
    }

    impl FakeHost {
        fn open(&self, id: &str, kind: Option<&str>, ready: bool) -> ContextId {
            let context = ContextId::new(id);
            self.windows.lock().push(context.clone());
            if let Some(kind) = kind {
                self.kinds.lock().insert(context.clone(), kind.to_string());
            }
            if ready {
                self.ready.lock().insert(context.clone());
            }
            context
        }

        fn finish_loading(&self, context: &ContextId, kind: &str) {
            self.kinds.lock().insert(context.clone(), kind.to_string());
            self.ready.lock().insert(context.clone());
        }
    }

    impl ContextHost for FakeHost {
        fn contexts(&self) -> Vec<ContextId> {
            self.windows.lock().clone()
        }

        fn is_ready(&self, context: &ContextId) -> bool {
            self.ready.lock().contains(context)
        }

        fn kind(&self, context: &ContextId) -> Option<String> {
            self.kinds.lock().get(context).cloned()
        }
    }

    fn collecting() -> (
        Arc<Mutex<Vec<ContextId>>>,
        impl Fn(&ContextId) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |context: &ContextId| -> anyhow::Result<()> {
            sink.lock().push(context.clone());
            Ok(())
        })
    }

    #[test]
    fn test_existing_ready_context_fires_immediately() {
        let host = Arc::new(FakeHost::default());
        let w1 = host.open("w1", Some("navigator:browser"), true);
        host.open("prefs", Some("prefs:dialog"), true);

        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let watcher = watch(&registry, &notifier, host, of_kind("navigator:browser"), on_ready);

        assert_eq!(*seen.lock(), vec![w1.clone()]);
        assert!(watcher.has_fired(&w1));
    }

    #[test]
    fn test_existing_loading_context_waits_for_ready() {
        let host = Arc::new(FakeHost::default());
        let w1 = host.open("w1", None, false);

        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let watcher = watch(
            &registry,
            &notifier,
            Arc::clone(&host) as Arc<dyn ContextHost>,
            of_kind("navigator:browser"),
            on_ready,
        );
        assert!(seen.lock().is_empty());
        assert!(watcher.is_awaiting(&w1));

        host.finish_loading(&w1, "navigator:browser");
        notifier.notify(&ContextEvent::Ready(w1.clone()));
        assert_eq!(*seen.lock(), vec![w1.clone()]);

        // A second ready notification must not fire again
        notifier.notify(&ContextEvent::Ready(w1.clone()));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_new_context_checked_after_ready() {
        let host = Arc::new(FakeHost::default());
        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let _watcher = watch(
            &registry,
            &notifier,
            Arc::clone(&host) as Arc<dyn ContextHost>,
            of_kind("navigator:browser"),
            on_ready,
        );

        let w2 = host.open("w2", None, false);
        notifier.notify(&ContextEvent::Created(w2.clone()));
        assert!(seen.lock().is_empty());

        host.finish_loading(&w2, "navigator:browser");
        notifier.notify(&ContextEvent::Ready(w2.clone()));
        assert_eq!(*seen.lock(), vec![w2]);

        let dialog = host.open("dialog", None, false);
        notifier.notify(&ContextEvent::Created(dialog.clone()));
        host.finish_loading(&dialog, "prefs:dialog");
        notifier.notify(&ContextEvent::Ready(dialog));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_ready_without_created_is_ignored() {
        let host = Arc::new(FakeHost::default());
        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let _watcher = watch(
            &registry,
            &notifier,
            Arc::clone(&host) as Arc<dyn ContextHost>,
            |_: &dyn ContextHost, _: &ContextId| true,
            on_ready,
        );

        let stray = host.open("stray", Some("navigator:browser"), true);
        notifier.notify(&ContextEvent::Ready(stray));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unload_stops_watching() {
        let host = Arc::new(FakeHost::default());
        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let watcher = watch(
            &registry,
            &notifier,
            Arc::clone(&host) as Arc<dyn ContextHost>,
            of_kind("navigator:browser"),
            on_ready,
        );
        assert!(watcher.is_active());

        registry.unload();
        assert!(!watcher.is_active());
        assert_eq!(notifier.subscriber_count(), 0);

        let w3 = host.open("w3", Some("navigator:browser"), true);
        notifier.notify(&ContextEvent::Created(w3));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_failing_callback_is_contained() {
        let host = Arc::new(FakeHost::default());
        let w1 = host.open("w1", Some("navigator:browser"), true);
        let w2 = host.open("w2", Some("navigator:browser"), true);

        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);

        let watcher = watch(
            &registry,
            &notifier,
            host,
            of_kind("navigator:browser"),
            move |_: &ContextId| {
                *counter.lock() += 1;
                Err(anyhow::anyhow!("window went away"))
            },
        );

        assert_eq!(*calls.lock(), 2);
        assert!(watcher.has_fired(&w1));
        assert!(watcher.has_fired(&w2));
    }

    #[test]
    fn test_destroyed_context_is_forgotten() {
        let host = Arc::new(FakeHost::default());
        let w1 = host.open("w1", None, false);

        let registry = Registry::new();
        let notifier = ContextNotifier::new();
        let (seen, on_ready) = collecting();

        let watcher = watch(
            &registry,
            &notifier,
            Arc::clone(&host) as Arc<dyn ContextHost>,
            of_kind("navigator:browser"),
            on_ready,
        );
        assert!(watcher.is_awaiting(&w1));

        notifier.notify(&ContextEvent::Destroyed(w1.clone()));
        assert!(!watcher.is_awaiting(&w1));

        notifier.notify(&ContextEvent::Ready(w1));
        assert!(seen.lock().is_empty());
    }
}
