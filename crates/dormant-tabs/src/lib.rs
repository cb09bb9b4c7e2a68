//! Dormant Tab Management
//!
//! Tabs start out as cheap placeholders and only load on demand. A loaded
//! tab can be evicted back to a placeholder: its state is serialized, a
//! placeholder carrying that state takes its slot, and the original is
//! removed without showing up as a user-facing close.

mod controller;
mod error;
mod host;
pub mod memory;
mod selector;
mod state;
mod tab;

pub use controller::{EvictOutcome, TabEvent, TabStateController};
pub use error::TabError;
pub use host::{
    AttachOptions, ListenerId, SerializedState, TabContainer, TabGrouping, TabStateSerializer,
};
pub use selector::{select_closest_loaded, Candidate, ClosestLoadedSelector, ProbeOrder, RemovedTab};
pub use state::TabState;
pub use tab::{Tab, TabId};

pub type Result<T> = std::result::Result<T, TabError>;
