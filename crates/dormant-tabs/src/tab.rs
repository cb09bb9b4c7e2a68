//! Tab data structure
//!
//! Tabs are owned by the host's tab container. Dormant only refers to them
//! by [`TabId`]; the owner link is a back-reference by identity, never an
//! ownership edge.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::TabError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    /// Unique identifier
    pub id: TabId,
    /// Current URL, `None` for a blank placeholder
    pub url: Option<Url>,
    /// Page title
    pub title: String,
    /// Tab that caused this one to be opened
    pub owner: Option<TabId>,
    /// Hidden tabs are not part of the visible strip
    pub hidden: bool,
}

impl Tab {
    pub fn new(url: &str) -> Result<Self> {
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }
        let url = Url::parse(url).map_err(|e| TabError::InvalidUrl(format!("{url}: {e}")))?;

        let mut tab = Self::placeholder();
        tab.url = Some(url);
        Ok(tab)
    }

    /// A blank tab, ready to receive serialized state.
    pub fn placeholder() -> Self {
        Self {
            id: TabId::new(),
            url: None,
            title: String::new(),
            owner: None,
            hidden: false,
        }
    }
}
