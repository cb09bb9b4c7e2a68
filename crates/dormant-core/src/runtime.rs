//! Dormant runtime
//!
//! Owns the lifecycle registry and the context notifier, attaches a tab
//! controller to every matching window once it is ready, and routes host
//! events to them.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use dormant_lifecycle::{
    of_kind, watch, ContextEvent, ContextHost, ContextId, ContextNotifier, ContextWatcher, Registry,
};
use dormant_tabs::{ClosestLoadedSelector, EvictOutcome, TabId, TabStateController};

use crate::config::Config;
use crate::error::CoreError;
use crate::host::{BrowserHost, HostEvent};
use crate::Result;

type Controllers = Arc<RwLock<HashMap<ContextId, Arc<TabStateController>>>>;

pub struct Dormant<H: BrowserHost + 'static> {
    config: Config,
    host: Arc<H>,
    registry: Registry,
    notifier: ContextNotifier,
    /// Controllers of live contexts
    controllers: Controllers,
    watcher: Mutex<Option<ContextWatcher>>,
}

impl<H: BrowserHost + 'static> Dormant<H> {
    pub fn new(config: Config, host: Arc<H>) -> Self {
        Self {
            config,
            host,
            registry: Registry::new(),
            notifier: ContextNotifier::new(),
            controllers: Arc::new(RwLock::new(HashMap::new())),
            watcher: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn notifier(&self) -> &ContextNotifier {
        &self.notifier
    }

    /// Start watching for windows. Existing ready windows get their
    /// controller immediately. Calling it again while running is a no-op.
    pub fn startup(&self) {
        let mut watcher = self.watcher.lock();
        if watcher.as_ref().is_some_and(ContextWatcher::is_active) {
            return;
        }

        let host = Arc::clone(&self.host);
        let registry = self.registry.clone();
        let controllers = Arc::clone(&self.controllers);
        let selector = self.config.selector();

        let context_host: Arc<dyn ContextHost> = self.host.clone();
        *watcher = Some(watch(
            &self.registry,
            &self.notifier,
            context_host,
            of_kind(self.config.context_kind.clone()),
            move |context: &ContextId| -> anyhow::Result<()> {
                attach_controller(host.as_ref(), &registry, &controllers, selector, context)
            },
        ));

        tracing::info!(context_kind = %self.config.context_kind, "Dormant started");
    }

    /// Tear everything down: controllers, listeners, the watcher itself.
    pub fn shutdown(&self) -> usize {
        let executed = self.registry.unload();
        self.watcher.lock().take();
        tracing::info!(executed, "Dormant shut down");
        executed
    }

    pub fn controller(&self, context: &ContextId) -> Result<Arc<TabStateController>> {
        self.controllers
            .read()
            .get(context)
            .cloned()
            .ok_or_else(|| CoreError::UnknownContext(context.to_string()))
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        let mut contexts: Vec<ContextId> = self.controllers.read().keys().cloned().collect();
        contexts.sort();
        contexts
    }

    pub fn dispatch(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Context(ContextEvent::Destroyed(context)) => {
                self.registry.context_destroyed(&context);
                self.notifier.notify(&ContextEvent::Destroyed(context));
            }
            HostEvent::Context(event) => self.notifier.notify(&event),
            HostEvent::Tab { context, event } => {
                self.controller(&context)?.handle_event(event)?;
            }
            HostEvent::Shutdown => {
                self.shutdown();
            }
        }
        Ok(())
    }

    pub fn can_evict(&self, context: &ContextId, tab: &TabId) -> bool {
        self.controller(context)
            .map(|controller| controller.can_evict(tab))
            .unwrap_or(false)
    }

    /// "Unload Tab"
    pub fn evict(&self, context: &ContextId, tab: &TabId) -> Result<EvictOutcome> {
        Ok(self.controller(context)?.evict(tab)?)
    }

    /// "Unload Other Tabs"
    pub fn evict_all(&self, context: &ContextId, except: &TabId) -> Result<Vec<EvictOutcome>> {
        Ok(self.controller(context)?.evict_all(except)?)
    }

    /// Handle host events one at a time until the host asks for shutdown or
    /// drops its sender, then tear down.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        self.startup();

        while let Some(event) = events.recv().await {
            if event == HostEvent::Shutdown {
                break;
            }
            if let Err(e) = self.dispatch(event) {
                tracing::warn!(error = %e, "Failed to handle host event");
            }
        }

        self.shutdown();
    }
}

fn attach_controller<H: BrowserHost>(
    host: &H,
    registry: &Registry,
    controllers: &Controllers,
    selector: ClosestLoadedSelector,
    context: &ContextId,
) -> anyhow::Result<()> {
    let container = host
        .tab_container(context)
        .ok_or_else(|| anyhow::anyhow!("Context {context} has no tab container"))?;
    let serializer = host
        .serializer(context)
        .ok_or_else(|| anyhow::anyhow!("Context {context} has no session serializer"))?;

    let mut controller = TabStateController::new(context.clone(), container, serializer, selector);
    if let Some(grouping) = host.grouping(context) {
        controller = controller.with_grouping(grouping);
    }
    let controller = Arc::new(controller);
    controller.attach(registry);

    let map = Arc::clone(controllers);
    let key = context.clone();
    registry.register(
        move || {
            map.write().remove(&key);
            Ok(())
        },
        Some(context),
    );

    controllers.write().insert(context.clone(), controller);
    Ok(())
}
