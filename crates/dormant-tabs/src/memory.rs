//! In-memory tab strip
//!
//! A self-contained implementation of every host collaborator: the tab
//! container, a JSON session serializer and tree-style grouping. Embedders
//! without a real browser behind them (and the test suites) drive Dormant
//! through it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::error::TabError;
use crate::host::{
    AttachOptions, ListenerId, SerializedState, TabContainer, TabGrouping, TabStateSerializer,
};
use crate::selector::RemovedTab;
use crate::tab::{Tab, TabId};
use crate::Result;

/// What the JSON serializer captures for a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionEntry {
    url: Option<Url>,
    title: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Default)]
struct StripInner {
    tabs: Vec<Tab>,
    selected: Option<TabId>,
    still_loading: HashSet<TabId>,
    data: HashMap<TabId, serde_json::Value>,
    listeners: HashMap<TabId, Vec<ListenerId>>,
    next_listener: u64,
    removing: HashSet<TabId>,
    vetoed: HashSet<TabId>,
    recently_closed: Vec<TabId>,
    /// child -> parent
    parents: HashMap<TabId, TabId>,
}

impl StripInner {
    fn index_of(&self, tab: &TabId) -> Option<usize> {
        self.tabs.iter().position(|t| &t.id == tab)
    }

    fn get(&self, tab: &TabId) -> Result<&Tab> {
        self.tabs
            .iter()
            .find(|t| &t.id == tab)
            .ok_or_else(|| TabError::NotFound(tab.to_string()))
    }

    fn get_mut(&mut self, tab: &TabId) -> Result<&mut Tab> {
        self.tabs
            .iter_mut()
            .find(|t| &t.id == tab)
            .ok_or_else(|| TabError::NotFound(tab.to_string()))
    }

    fn move_to(&mut self, tab: &TabId, index: usize) -> Result<()> {
        let current = self
            .index_of(tab)
            .ok_or_else(|| TabError::NotFound(tab.to_string()))?;
        let moved = self.tabs.remove(current);
        let index = index.min(self.tabs.len());
        self.tabs.insert(index, moved);
        Ok(())
    }

    fn drop_tab(&mut self, tab: &TabId) -> Option<usize> {
        let index = self.index_of(tab)?;
        self.tabs.remove(index);
        self.still_loading.remove(tab);
        self.data.remove(tab);
        self.listeners.remove(tab);
        self.removing.remove(tab);
        self.parents.remove(tab);
        self.parents.retain(|_, parent| parent != tab);

        if self.selected.as_ref() == Some(tab) {
            let next = index.min(self.tabs.len().saturating_sub(1));
            self.selected = self.tabs.get(next).map(|t| t.id.clone());
        }
        Some(index)
    }
}

/// One window's tab strip, held in memory.
#[derive(Default)]
pub struct MemoryTabStrip {
    inner: Mutex<StripInner>,
}

impl MemoryTabStrip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a loaded tab. The first tab opened becomes selected.
    pub fn open(&self, url: &str) -> Result<TabId> {
        self.push(Tab::new(url)?, false)
    }

    /// Append a tab the session restorer has not loaded yet.
    pub fn open_unrestored(&self, url: &str) -> Result<TabId> {
        self.push(Tab::new(url)?, true)
    }

    /// Append an already built tab.
    pub fn push(&self, tab: Tab, still_loading: bool) -> Result<TabId> {
        let mut inner = self.inner.lock();
        let id = tab.id.clone();
        if inner.index_of(&id).is_some() {
            return Err(TabError::Container(format!("Duplicate tab id: {id}")));
        }
        inner.tabs.push(tab);
        if still_loading {
            inner.still_loading.insert(id.clone());
        }
        if inner.selected.is_none() {
            inner.selected = Some(id.clone());
        }
        Ok(id)
    }

    pub fn get(&self, tab: &TabId) -> Option<Tab> {
        self.inner.lock().get(tab).ok().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_title(&self, tab: &TabId, title: &str) -> Result<()> {
        self.inner.lock().get_mut(tab)?.title = title.to_string();
        Ok(())
    }

    pub fn set_owner(&self, tab: &TabId, owner: Option<TabId>) -> Result<()> {
        self.inner.lock().get_mut(tab)?.owner = owner;
        Ok(())
    }

    pub fn set_hidden(&self, tab: &TabId, hidden: bool) -> Result<()> {
        self.inner.lock().get_mut(tab)?.hidden = hidden;
        Ok(())
    }

    /// Page data the serializer captures along with URL and title.
    pub fn set_data(&self, tab: &TabId, data: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.get(tab)?;
        inner.data.insert(tab.clone(), data);
        Ok(())
    }

    pub fn data(&self, tab: &TabId) -> Option<serde_json::Value> {
        self.inner.lock().data.get(tab).cloned()
    }

    /// Mark the restorer as done with a tab.
    pub fn finish_restore(&self, tab: &TabId) {
        self.inner.lock().still_loading.remove(tab);
    }

    /// Refuse the next removal of `tab`.
    pub fn veto_removal(&self, tab: &TabId) {
        self.inner.lock().vetoed.insert(tab.clone());
    }

    /// Close a tab the way a user would. Recorded as recently closed.
    /// Returns what the tab looked like just before it went away.
    pub fn close(&self, tab: &TabId) -> Result<RemovedTab> {
        let mut inner = self.inner.lock();
        let index = inner
            .index_of(tab)
            .ok_or_else(|| TabError::NotFound(tab.to_string()))?;
        let removed = RemovedTab {
            id: tab.clone(),
            owner: inner.tabs[index].owner.clone(),
            next_sibling: inner.tabs.get(index + 1).map(|t| t.id.clone()),
        };
        inner.drop_tab(tab);
        inner.recently_closed.push(tab.clone());
        Ok(removed)
    }

    pub fn recently_closed(&self) -> Vec<TabId> {
        self.inner.lock().recently_closed.clone()
    }

    pub fn listener_count(&self, tab: &TabId) -> usize {
        self.inner.lock().listeners.get(tab).map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        self.inner.lock().listeners.values().map(Vec::len).sum()
    }
}

impl TabContainer for MemoryTabStrip {
    fn tabs(&self) -> Vec<TabId> {
        self.inner.lock().tabs.iter().map(|t| t.id.clone()).collect()
    }

    fn visible_tabs(&self) -> Vec<TabId> {
        self.inner
            .lock()
            .tabs
            .iter()
            .filter(|t| !t.hidden)
            .map(|t| t.id.clone())
            .collect()
    }

    fn selected(&self) -> Option<TabId> {
        self.inner.lock().selected.clone()
    }

    fn set_active(&self, tab: &TabId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.get(tab)?;
        inner.selected = Some(tab.clone());
        Ok(())
    }

    fn position(&self, tab: &TabId) -> Option<usize> {
        self.inner.lock().index_of(tab)
    }

    fn owner(&self, tab: &TabId) -> Option<TabId> {
        self.inner.lock().get(tab).ok().and_then(|t| t.owner.clone())
    }

    fn insert_at(&self, index: usize, tab: Tab) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.index_of(&tab.id).is_some() {
            return Err(TabError::Container(format!("Duplicate tab id: {}", tab.id)));
        }
        let index = index.min(inner.tabs.len());
        inner.tabs.insert(index, tab);
        Ok(())
    }

    fn move_to(&self, tab: &TabId, index: usize) -> Result<()> {
        self.inner.lock().move_to(tab, index)
    }

    fn begin_remove(&self, tab: &TabId) -> bool {
        let mut inner = self.inner.lock();
        if inner.index_of(tab).is_none() || inner.vetoed.remove(tab) {
            return false;
        }
        inner.removing.insert(tab.clone())
    }

    fn end_remove(&self, tab: &TabId) {
        let mut inner = self.inner.lock();
        if inner.removing.contains(tab) {
            inner.drop_tab(tab);
        }
    }

    fn is_still_loading(&self, tab: &TabId) -> bool {
        self.inner.lock().still_loading.contains(tab)
    }

    fn add_progress_listener(&self, tab: &TabId) -> Result<ListenerId> {
        let mut inner = self.inner.lock();
        inner.get(tab)?;
        inner.next_listener += 1;
        let id = ListenerId(inner.next_listener);
        inner.listeners.entry(tab.clone()).or_default().push(id);
        Ok(id)
    }

    fn remove_progress_listener(&self, tab: &TabId, listener: ListenerId) {
        let mut inner = self.inner.lock();
        if let Some(ids) = inner.listeners.get_mut(tab) {
            ids.retain(|id| *id != listener);
            if ids.is_empty() {
                inner.listeners.remove(tab);
            }
        }
    }
}

impl TabStateSerializer for MemoryTabStrip {
    fn serialize(&self, tab: &TabId) -> Result<SerializedState> {
        let inner = self.inner.lock();
        let current = inner.get(tab)?;
        let entry = SessionEntry {
            url: current.url.clone(),
            title: current.title.clone(),
            data: inner.data.get(tab).cloned().unwrap_or_default(),
        };
        Ok(SerializedState::new(serde_json::to_string(&entry)?))
    }

    fn deserialize(&self, tab: &TabId, state: &SerializedState) -> Result<()> {
        let entry: SessionEntry = serde_json::from_str(state.as_str())?;
        let mut inner = self.inner.lock();
        let target = inner.get_mut(tab)?;
        target.url = entry.url;
        target.title = entry.title;
        inner.data.insert(tab.clone(), entry.data);
        // Content comes back only when the tab is selected
        inner.still_loading.insert(tab.clone());
        Ok(())
    }
}

impl TabGrouping for MemoryTabStrip {
    fn parent(&self, tab: &TabId) -> Option<TabId> {
        self.inner.lock().parents.get(tab).cloned()
    }

    fn children(&self, tab: &TabId) -> Vec<TabId> {
        let inner = self.inner.lock();
        inner
            .tabs
            .iter()
            .filter(|t| inner.parents.get(&t.id) == Some(tab))
            .map(|t| t.id.clone())
            .collect()
    }

    fn attach(&self, child: &TabId, parent: &TabId, options: AttachOptions) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.get(child)?;
        inner.get(parent)?;
        if child == parent {
            return Err(TabError::Container(format!("Tab {child} cannot be its own parent")));
        }
        inner.parents.insert(child.clone(), parent.clone());

        if let Some(before) = options.insert_before.filter(|b| b != child) {
            if let (Some(from), Some(to)) = (inner.index_of(child), inner.index_of(&before)) {
                let to = if from < to { to - 1 } else { to };
                inner.move_to(child, to)?;
            }
        }
        Ok(())
    }
}
