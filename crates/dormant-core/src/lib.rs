//! Dormant Core
//!
//! Wires the lifecycle registry, the context watcher and one tab controller
//! per browser window into a single runtime driven by host events.

mod config;
mod error;
mod host;
mod runtime;

pub use config::Config;
pub use error::CoreError;
pub use host::{BrowserHost, HostEvent};
pub use runtime::Dormant;

// Re-export the building blocks
pub use dormant_lifecycle::{
    ContextEvent, ContextHost, ContextId, ContextNotifier, Registry, UnloadHandle,
};
pub use dormant_tabs::{
    EvictOutcome, ProbeOrder, RemovedTab, TabContainer, TabError, TabEvent, TabGrouping, TabId,
    TabState, TabStateController, TabStateSerializer,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging. `RUST_LOG` wins over the configured filter.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    // A subscriber may already be installed (tests, embedding hosts)
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
