//! Dormant Lifecycle
//!
//! Cleanup bookkeeping for everything Dormant hooks into a host. Actions
//! registered here run exactly once, either when their context goes away
//! or on global teardown.

mod context;
mod registry;
mod watcher;

pub use context::{ContextEvent, ContextHost, ContextId, ContextNotifier, SubscriptionId};
pub use registry::{ListenerHandle, Registry, UnloadAction, UnloadHandle, UnloadId};
pub use watcher::{of_kind, watch, ContextWatcher};
