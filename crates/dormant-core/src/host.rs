//! Host integration surface

use std::sync::Arc;

use dormant_lifecycle::{ContextEvent, ContextHost, ContextId};
use dormant_tabs::{TabContainer, TabEvent, TabGrouping, TabStateSerializer};

/// A browser that exposes its windows as contexts and hands out the tab
/// collaborators of each window.
pub trait BrowserHost: ContextHost {
    fn tab_container(&self, context: &ContextId) -> Option<Arc<dyn TabContainer>>;

    fn serializer(&self, context: &ContextId) -> Option<Arc<dyn TabStateSerializer>>;

    /// Tree-style grouping, when the host has it.
    fn grouping(&self, _context: &ContextId) -> Option<Arc<dyn TabGrouping>> {
        None
    }
}

/// Everything the host reports to Dormant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Context(ContextEvent),
    Tab { context: ContextId, event: TabEvent },
    Shutdown,
}

impl From<ContextEvent> for HostEvent {
    fn from(event: ContextEvent) -> Self {
        HostEvent::Context(event)
    }
}
