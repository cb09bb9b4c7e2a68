//! Closest loaded tab selection
//!
//! Picks the tab that should become active when the active tab is evicted
//! or closed. Loaded tabs near the removed one win; pending tabs are only
//! nominated when nothing loaded is left.

use serde::{Deserialize, Serialize};

use crate::error::TabError;
use crate::tab::TabId;
use crate::Result;

/// Order in which neighbours of the removed tab are probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOrder {
    /// Everything to the right first (the slot itself, then its left
    /// neighbour if the removed tab is already gone, then rightwards),
    /// then leftwards.
    #[default]
    ForwardFirst,
    /// Alternate right/left at growing distance.
    Alternating,
}

/// A visible tab as seen by the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: TabId,
    pub pending: bool,
}

impl Candidate {
    pub fn new(id: TabId, pending: bool) -> Self {
        Self { id, pending }
    }
}

/// The tab being evicted or closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTab {
    pub id: TabId,
    pub owner: Option<TabId>,
    /// Sibling that followed the tab when it was removed. Used to locate its
    /// old slot once the tab has already left the visible list.
    pub next_sibling: Option<TabId>,
}

impl RemovedTab {
    pub fn new(id: TabId) -> Self {
        Self {
            id,
            owner: None,
            next_sibling: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosestLoadedSelector {
    pub prefer_owner_on_close: bool,
    pub probe_order: ProbeOrder,
}

impl ClosestLoadedSelector {
    pub fn new(prefer_owner_on_close: bool) -> Self {
        Self {
            prefer_owner_on_close,
            probe_order: ProbeOrder::default(),
        }
    }

    pub fn with_probe_order(mut self, probe_order: ProbeOrder) -> Self {
        self.probe_order = probe_order;
        self
    }

    /// Choose a replacement for `removed` among `visible`.
    ///
    /// `Ok(None)` means there is no other tab to switch to. An error means
    /// the visible list is inconsistent with the removed tab; callers treat
    /// it as "no replacement".
    pub fn select(&self, visible: &[Candidate], removed: &RemovedTab) -> Result<Option<TabId>> {
        let len = visible.len();
        if len == 0 {
            return Err(exhausted(len, 0));
        }
        if len == 1 {
            return Ok(None);
        }

        let owner_index = removed
            .owner
            .as_ref()
            .filter(|owner| **owner != removed.id)
            .and_then(|owner| visible.iter().position(|c| &c.id == owner));

        if self.prefer_owner_on_close {
            if let Some(i) = owner_index.filter(|&i| !visible[i].pending) {
                return Ok(Some(visible[i].id.clone()));
            }
        }

        let index = anchor_index(visible, removed);
        let usable = |i: usize| !visible[i].pending && visible[i].id != removed.id;
        let excised = visible[index].id != removed.id;

        let found = match self.probe_order {
            ProbeOrder::ForwardFirst => probe_forward_first(len, index, excised, usable),
            ProbeOrder::Alternating => probe_alternating(len, index, excised, usable),
        };
        if let Some(i) = found {
            return Ok(Some(visible[i].id.clone()));
        }

        // Nothing loaded left, nominate a pending tab
        if self.prefer_owner_on_close {
            if let Some(i) = owner_index {
                return Ok(Some(visible[i].id.clone()));
            }
        }
        if excised {
            return Ok(Some(visible[index].id.clone()));
        }
        if index + 1 < len {
            return Ok(Some(visible[index + 1].id.clone()));
        }
        if index >= 1 {
            return Ok(Some(visible[index - 1].id.clone()));
        }

        Err(exhausted(len, index))
    }
}

/// [`ClosestLoadedSelector::select`] with the default probe order.
pub fn select_closest_loaded(
    visible: &[Candidate],
    removed: &RemovedTab,
    prefer_owner_on_close: bool,
) -> Result<Option<TabId>> {
    ClosestLoadedSelector::new(prefer_owner_on_close).select(visible, removed)
}

/// Index of the removed tab, or of its old next sibling if it already left
/// the list, or the last index.
fn anchor_index(visible: &[Candidate], removed: &RemovedTab) -> usize {
    let mut index = 0;
    while index + 1 < visible.len()
        && visible[index].id != removed.id
        && Some(&visible[index].id) != removed.next_sibling.as_ref()
    {
        index += 1;
    }
    index
}

fn probe_forward_first(
    len: usize,
    index: usize,
    excised: bool,
    usable: impl Fn(usize) -> bool,
) -> Option<usize> {
    if usable(index) {
        return Some(index);
    }
    // The removed tab shifted everything after it down by one, so the
    // left neighbour is as close as the slot itself.
    if excised && index >= 1 && usable(index - 1) {
        return Some(index - 1);
    }
    if let Some(i) = (index + 1..len).find(|&i| usable(i)) {
        return Some(i);
    }
    (0..index).rev().find(|&i| usable(i))
}

fn probe_alternating(
    len: usize,
    index: usize,
    excised: bool,
    usable: impl Fn(usize) -> bool,
) -> Option<usize> {
    let mut radius = 0;
    while radius <= index || index + radius < len {
        if index + radius < len && usable(index + radius) {
            return Some(index + radius);
        }
        let back = if radius == 0 && excised { 1 } else { radius };
        if back <= index && usable(index - back) {
            return Some(index - back);
        }
        radius += 1;
    }
    None
}

fn exhausted(visible: usize, index: usize) -> TabError {
    tracing::error!(
        visible,
        index,
        "Visible tabs left but no replacement tab found"
    );
    TabError::SelectorExhausted { visible, index }
}
