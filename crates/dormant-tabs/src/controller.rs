//! Tab State Controller
//!
//! One controller per context. Tracks which tabs are placeholders, watches
//! restoring tabs for their first network activity, and evicts loaded tabs
//! back to placeholders.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use dormant_lifecycle::{ContextId, Registry, UnloadHandle};

use crate::error::TabError;
use crate::host::{AttachOptions, ListenerId, TabContainer, TabGrouping, TabStateSerializer};
use crate::selector::{Candidate, ClosestLoadedSelector, RemovedTab};
use crate::state::TabState;
use crate::tab::{Tab, TabId};
use crate::Result;

/// Tab notifications the host delivers to a context's controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// The session restorer is about to restore the tab.
    RestoreStarting(TabId),
    /// The tab became the selected one.
    Selected(TabId),
    /// Network state changed for the tab's content.
    NetworkStateChanged(TabId),
    /// The host removed the tab. `removed` is captured just before the
    /// removal so its old slot can still be located.
    Closed {
        removed: RemovedTab,
        was_selected: bool,
    },
}

impl TabEvent {
    pub fn tab(&self) -> &TabId {
        match self {
            TabEvent::RestoreStarting(tab)
            | TabEvent::Selected(tab)
            | TabEvent::NetworkStateChanged(tab) => tab,
            TabEvent::Closed { removed, .. } => &removed.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The tab already was a placeholder; nothing happened.
    AlreadyPending,
    /// The tab was replaced by `placeholder` and removed.
    Evicted { placeholder: TabId },
    /// The container refused to remove the original; both tabs remain.
    RemovalVetoed { placeholder: TabId },
    /// Eviction failed part way; only reported by `evict_all`.
    Failed { tab: TabId, error: String },
}

impl EvictOutcome {
    pub fn placeholder(&self) -> Option<&TabId> {
        match self {
            EvictOutcome::AlreadyPending | EvictOutcome::Failed { .. } => None,
            EvictOutcome::Evicted { placeholder } | EvictOutcome::RemovalVetoed { placeholder } => {
                Some(placeholder)
            }
        }
    }
}

#[derive(Default)]
struct Tracking {
    /// Tabs not in `Loaded`; absent means loaded
    states: HashMap<TabId, TabState>,
    /// One-shot network listeners, keyed by tab
    listeners: HashMap<TabId, ListenerId>,
    torn_down: bool,
}

pub struct TabStateController {
    context: ContextId,
    container: Arc<dyn TabContainer>,
    serializer: Arc<dyn TabStateSerializer>,
    grouping: Option<Arc<dyn TabGrouping>>,
    selector: ClosestLoadedSelector,
    tracking: Mutex<Tracking>,
}

impl TabStateController {
    pub fn new(
        context: ContextId,
        container: Arc<dyn TabContainer>,
        serializer: Arc<dyn TabStateSerializer>,
        selector: ClosestLoadedSelector,
    ) -> Self {
        Self {
            context,
            container,
            serializer,
            grouping: None,
            selector,
            tracking: Mutex::new(Tracking::default()),
        }
    }

    pub fn with_grouping(mut self, grouping: Arc<dyn TabGrouping>) -> Self {
        self.grouping = Some(grouping);
        self
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Hook the tabs the session restorer has not loaded yet and register
    /// the controller's teardown, scoped to its context.
    pub fn attach(self: &Arc<Self>, registry: &Registry) -> UnloadHandle {
        let hooked = self.hook_unrestored_tabs();

        let controller = Arc::clone(self);
        let handle = registry.register(
            move || {
                controller.unload();
                Ok(())
            },
            Some(&self.context),
        );

        tracing::info!(context = %self.context, hooked, "Tab controller attached");
        handle
    }

    fn hook_unrestored_tabs(&self) -> usize {
        let selected = self.container.selected();
        let mut hooked = 0;

        for tab in self.container.tabs() {
            if selected.as_ref() == Some(&tab)
                || self.has_listener(&tab)
                || !self.container.is_still_loading(&tab)
            {
                continue;
            }
            match self.mark_pending(&tab) {
                Ok(()) => hooked += 1,
                Err(e) => {
                    tracing::warn!(context = %self.context, tab_id = %tab, error = %e, "Failed to hook unrestored tab");
                }
            }
        }
        hooked
    }

    /// Detach every listener and forget all placeholder markers. Safe to
    /// call more than once.
    pub fn unload(&self) {
        let listeners: Vec<(TabId, ListenerId)> = {
            let mut tracking = self.tracking.lock();
            tracking.torn_down = true;
            tracking.states.clear();
            tracking.listeners.drain().collect()
        };

        for (tab, listener) in &listeners {
            self.container.remove_progress_listener(tab, *listener);
        }

        tracing::info!(
            context = %self.context,
            detached = listeners.len(),
            "Tab controller unloaded"
        );
    }

    pub fn is_unloaded(&self) -> bool {
        self.tracking.lock().torn_down
    }

    /// Nothing would detach listeners hooked after teardown.
    fn ensure_attached(&self) -> Result<()> {
        if self.is_unloaded() {
            return Err(TabError::Unloaded(self.context.to_string()));
        }
        Ok(())
    }

    pub fn state(&self, tab: &TabId) -> TabState {
        self.tracking
            .lock()
            .states
            .get(tab)
            .copied()
            .unwrap_or_default()
    }

    /// Tabs currently in a placeholder state, in strip order.
    pub fn pending_tabs(&self) -> Vec<TabId> {
        let tabs = self.container.tabs();
        let tracking = self.tracking.lock();
        tabs.into_iter()
            .filter(|tab| tracking.states.contains_key(tab))
            .collect()
    }

    /// Whether an "unload tab" command should be offered for `tab`.
    pub fn can_evict(&self, tab: &TabId) -> bool {
        self.container.position(tab).is_some() && !self.state(tab).is_pending()
    }

    pub fn has_listener(&self, tab: &TabId) -> bool {
        self.tracking.lock().listeners.contains_key(tab)
    }

    pub fn handle_event(&self, event: TabEvent) -> Result<()> {
        if self.is_unloaded() {
            tracing::trace!(context = %self.context, ?event, "Ignoring tab event after unload");
            return Ok(());
        }

        match event {
            TabEvent::RestoreStarting(tab) => self.on_restore_starting(&tab),
            TabEvent::Selected(tab) => self.on_selected(&tab),
            TabEvent::NetworkStateChanged(tab) => {
                self.on_network_state_changed(&tab);
                Ok(())
            }
            TabEvent::Closed {
                removed,
                was_selected,
            } => self.on_closed(&removed, was_selected),
        }
    }

    fn on_closed(&self, removed: &RemovedTab, was_selected: bool) -> Result<()> {
        self.forget(&removed.id);
        if !was_selected {
            return Ok(());
        }

        match self.closest_loaded_to(removed) {
            Ok(Some(replacement)) => self.container.set_active(&replacement)?,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(context = %self.context, tab_id = %removed.id, error = %e, "No replacement for closed tab");
            }
        }
        Ok(())
    }

    fn on_restore_starting(&self, tab: &TabId) -> Result<()> {
        if self.container.selected().as_ref() == Some(tab) {
            return Ok(());
        }
        if self.state(tab).is_pending() {
            self.ensure_listener(tab)
        } else {
            self.mark_pending(tab)
        }
    }

    fn on_selected(&self, tab: &TabId) -> Result<()> {
        if self.state(tab) != TabState::Pending {
            return Ok(());
        }
        self.ensure_listener(tab)?;
        self.transition(tab, TabState::Restoring)
    }

    /// The one-shot listener fires: detach it and mark the tab loaded. A
    /// second notification, or one for a tab that was never hooked, is a
    /// no-op.
    fn on_network_state_changed(&self, tab: &TabId) {
        let listener = self.tracking.lock().listeners.remove(tab);
        let Some(listener) = listener else {
            return;
        };

        self.container.remove_progress_listener(tab, listener);
        if let Err(e) = self.transition(tab, TabState::Loaded) {
            tracing::warn!(context = %self.context, tab_id = %tab, error = %e, "Unexpected state on load");
            self.tracking.lock().states.remove(tab);
        }
    }

    fn mark_pending(&self, tab: &TabId) -> Result<()> {
        self.ensure_listener(tab)?;
        self.transition(tab, TabState::Pending)
    }

    fn ensure_listener(&self, tab: &TabId) -> Result<()> {
        if self.has_listener(tab) {
            return Ok(());
        }
        let listener = self.container.add_progress_listener(tab)?;
        self.tracking.lock().listeners.insert(tab.clone(), listener);
        Ok(())
    }

    fn transition(&self, tab: &TabId, to: TabState) -> Result<()> {
        let mut tracking = self.tracking.lock();
        let from = tracking.states.get(tab).copied().unwrap_or_default();

        if !from.can_transition_to(to) {
            return Err(TabError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        tracing::debug!(
            context = %self.context,
            tab_id = %tab,
            from = %from,
            to = %to,
            "Tab state transition"
        );

        if to == TabState::Loaded {
            tracking.states.remove(tab);
        } else {
            tracking.states.insert(tab.clone(), to);
        }
        Ok(())
    }

    /// Drop all bookkeeping for a tab that left the strip.
    fn forget(&self, tab: &TabId) {
        let listener = {
            let mut tracking = self.tracking.lock();
            tracking.states.remove(tab);
            tracking.listeners.remove(tab)
        };
        if let Some(listener) = listener {
            self.container.remove_progress_listener(tab, listener);
        }
    }

    /// The tab that should become active if `tab`, still in the strip,
    /// goes away.
    pub fn closest_loaded(&self, tab: &TabId) -> Result<Option<TabId>> {
        let removed = RemovedTab {
            id: tab.clone(),
            owner: self.container.owner(tab),
            next_sibling: self.container.next_sibling(tab),
        };
        self.closest_loaded_to(&removed)
    }

    /// Like [`closest_loaded`](Self::closest_loaded), for a tab that may
    /// already have left the strip.
    pub fn closest_loaded_to(&self, removed: &RemovedTab) -> Result<Option<TabId>> {
        let visible: Vec<Candidate> = self
            .container
            .visible_tabs()
            .into_iter()
            .map(|id| {
                let pending = self.state(&id).is_pending();
                Candidate::new(id, pending)
            })
            .collect();

        self.selector.select(&visible, removed)
    }

    /// Replace a loaded tab with a placeholder carrying its state.
    pub fn evict(&self, tab: &TabId) -> Result<EvictOutcome> {
        self.ensure_attached()?;
        if self.state(tab).is_pending() {
            tracing::debug!(context = %self.context, tab_id = %tab, "Tab already pending");
            return Ok(EvictOutcome::AlreadyPending);
        }

        // Never leave the context without an active tab
        if self.container.selected().as_ref() == Some(tab) {
            match self.closest_loaded(tab) {
                Ok(Some(replacement)) => self.container.set_active(&replacement)?,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(context = %self.context, tab_id = %tab, error = %e, "No replacement for active tab");
                }
            }
        }

        let state = self.serializer.serialize(tab)?;

        let position = self
            .container
            .position(tab)
            .ok_or_else(|| TabError::NotFound(tab.to_string()))?;
        let placeholder = Tab::placeholder();
        let placeholder_id = placeholder.id.clone();
        self.container.insert_at(position + 1, placeholder)?;

        self.serializer.deserialize(&placeholder_id, &state)?;
        self.mark_pending(&placeholder_id)?;
        self.transplant_grouping(tab, &placeholder_id);

        if !self.container.begin_remove(tab) {
            tracing::warn!(
                context = %self.context,
                tab_id = %tab,
                placeholder = %placeholder_id,
                "Tab removal refused, placeholder left next to it"
            );
            return Ok(EvictOutcome::RemovalVetoed {
                placeholder: placeholder_id,
            });
        }
        self.container.end_remove(tab);
        self.forget(tab);

        tracing::info!(
            context = %self.context,
            tab_id = %tab,
            placeholder = %placeholder_id,
            "Evicted tab"
        );

        Ok(EvictOutcome::Evicted {
            placeholder: placeholder_id,
        })
    }

    fn transplant_grouping(&self, original: &TabId, placeholder: &TabId) {
        let Some(grouping) = &self.grouping else {
            return;
        };

        if let Some(parent) = grouping.parent(original) {
            let options = AttachOptions {
                animate: false,
                insert_before: self.container.next_sibling(placeholder),
            };
            if let Err(e) = grouping.attach(placeholder, &parent, options) {
                tracing::warn!(tab_id = %placeholder, parent = %parent, error = %e, "Failed to attach placeholder to parent");
            }
        }

        for child in grouping.children(original) {
            let options = AttachOptions {
                animate: false,
                insert_before: None,
            };
            if let Err(e) = grouping.attach(&child, placeholder, options) {
                tracing::warn!(tab_id = %child, parent = %placeholder, error = %e, "Failed to move child to placeholder");
            }
        }
    }

    /// Select `except` and evict every other tab.
    pub fn evict_all(&self, except: &TabId) -> Result<Vec<EvictOutcome>> {
        self.ensure_attached()?;
        if self.container.position(except).is_none() {
            return Err(TabError::NotFound(except.to_string()));
        }
        if self.container.selected().as_ref() != Some(except) {
            self.container.set_active(except)?;
        }

        // Eviction inserts and removes tabs, so work off a snapshot
        let snapshot = self.container.tabs();
        let mut outcomes = Vec::with_capacity(snapshot.len().saturating_sub(1));

        for tab in snapshot.iter().filter(|tab| *tab != except) {
            match self.evict(tab) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(context = %self.context, tab_id = %tab, error = %e, "Failed to evict tab");
                    outcomes.push(EvictOutcome::Failed {
                        tab: tab.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, EvictOutcome::Failed { .. }))
            .count();
        tracing::info!(
            context = %self.context,
            kept = %except,
            processed = outcomes.len(),
            failed,
            "Evicted other tabs"
        );

        Ok(outcomes)
    }
}
