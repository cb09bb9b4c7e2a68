//! Tab State Machine
//!
//! ```text
//! Loaded
//!   ↓ evicted / restore starting in background
//! Pending ──────────────┐
//!   ↓ selected          │ first network state change
//! Restoring             │
//!   ↓ first network state change
//! Loaded ◄──────────────┘
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabState {
    /// Placeholder, content not fetched
    Pending,
    /// Content fetch started, waiting for the first network activity
    Restoring,
    /// Content present and live
    #[default]
    Loaded,
}

impl TabState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: TabState) -> bool {
        match (self, target) {
            (TabState::Loaded, TabState::Pending) => true,
            (TabState::Pending, TabState::Restoring) => true,
            (TabState::Pending, TabState::Loaded) => true,
            (TabState::Restoring, TabState::Loaded) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    /// Returns true while the tab's content is not live yet. Such a tab is
    /// never picked as a loaded replacement and cannot be evicted.
    pub fn is_pending(&self) -> bool {
        matches!(self, TabState::Pending | TabState::Restoring)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TabState::Pending => "pending",
            TabState::Restoring => "restoring",
            TabState::Loaded => "loaded",
        }
    }
}

impl std::fmt::Display for TabState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TabState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TabState::Pending),
            "restoring" => Ok(TabState::Restoring),
            "loaded" => Ok(TabState::Loaded),
            _ => Err(format!("Unknown tab state: {}", s)),
        }
    }
}
