//! Collaborators the host provides to the tab controller

use serde::{Deserialize, Serialize};

use crate::tab::{Tab, TabId};
use crate::Result;

/// Opaque snapshot of a tab produced by a [`TabStateSerializer`]. Dormant
/// only carries it from the evicted tab to its placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedState(String);

impl SerializedState {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Captures and re-applies tab state (the session store).
pub trait TabStateSerializer: Send + Sync {
    /// Snapshot the tab's current content.
    fn serialize(&self, tab: &TabId) -> Result<SerializedState>;

    /// Apply a snapshot so the tab can later be rehydrated from it.
    fn deserialize(&self, tab: &TabId, state: &SerializedState) -> Result<()>;
}

/// Identity of a network progress listener attached to a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// The ordered tab strip of one context.
pub trait TabContainer: Send + Sync {
    /// All tabs, in strip order.
    fn tabs(&self) -> Vec<TabId>;

    /// Tabs currently shown in the strip, in order.
    fn visible_tabs(&self) -> Vec<TabId>;

    fn selected(&self) -> Option<TabId>;

    fn set_active(&self, tab: &TabId) -> Result<()>;

    fn position(&self, tab: &TabId) -> Option<usize>;

    fn owner(&self, tab: &TabId) -> Option<TabId>;

    fn next_sibling(&self, tab: &TabId) -> Option<TabId> {
        let tabs = self.tabs();
        let index = tabs.iter().position(|t| t == tab)?;
        tabs.get(index + 1).cloned()
    }

    fn insert_at(&self, index: usize, tab: Tab) -> Result<()>;

    fn move_to(&self, tab: &TabId, index: usize) -> Result<()>;

    /// First phase of a removal that is not recorded as a user close.
    /// Returns false when the removal is refused.
    fn begin_remove(&self, tab: &TabId) -> bool;

    fn end_remove(&self, tab: &TabId);

    /// Whether the session restorer still has to load this tab.
    fn is_still_loading(&self, tab: &TabId) -> bool;

    /// Watch the tab for network state changes.
    fn add_progress_listener(&self, tab: &TabId) -> Result<ListenerId>;

    /// Must tolerate listeners and tabs that are already gone.
    fn remove_progress_listener(&self, tab: &TabId, listener: ListenerId);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOptions {
    pub animate: bool,
    pub insert_before: Option<TabId>,
}

/// Parent/child tab relationships maintained by tree-style tab tooling.
pub trait TabGrouping: Send + Sync {
    fn parent(&self, tab: &TabId) -> Option<TabId>;

    /// Children in strip order.
    fn children(&self, tab: &TabId) -> Vec<TabId>;

    fn attach(&self, child: &TabId, parent: &TabId, options: AttachOptions) -> Result<()>;
}
