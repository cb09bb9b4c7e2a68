//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use dormant_tabs::{ClosestLoadedSelector, ProbeOrder};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Switch back to the tab that opened the removed one, if it is loaded
    pub prefer_owner_on_close: bool,
    /// Kind of context that gets a tab controller
    pub context_kind: String,
    /// Neighbour probing order when picking a replacement tab
    pub probe_order: ProbeOrder,
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            prefer_owner_on_close: true,
            context_kind: "navigator:browser".to_string(),
            probe_order: ProbeOrder::default(),
            log_filter: "info".to_string(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.context_kind.trim().is_empty() {
            return Err(CoreError::Config("context_kind cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn selector(&self) -> ClosestLoadedSelector {
        ClosestLoadedSelector::new(self.prefer_owner_on_close).with_probe_order(self.probe_order)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.prefer_owner_on_close);
        assert_eq!(config.context_kind, "navigator:browser");
        assert_eq!(config.probe_order, ProbeOrder::ForwardFirst);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config =
            Config::from_json(r#"{ "prefer_owner_on_close": false, "probe_order": "alternating" }"#)
                .unwrap();
        assert!(!config.prefer_owner_on_close);
        assert_eq!(config.probe_order, ProbeOrder::Alternating);
        assert_eq!(config.context_kind, "navigator:browser");

        let selector = config.selector();
        assert!(!selector.prefer_owner_on_close);
        assert_eq!(selector.probe_order, ProbeOrder::Alternating);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = Config::from_json("{ not json");
        assert!(matches!(result, Err(CoreError::Serialization(_))));

        let result = Config::from_json(r#"{ "probe_order": "sideways" }"#);
        assert!(matches!(result, Err(CoreError::Serialization(_))));
    }

    #[test]
    fn test_empty_context_kind_rejected() {
        let result = Config::from_json(r#"{ "context_kind": "  " }"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dormant-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "log_filter": "dormant=debug" }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_filter, "dormant=debug");
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(Config::load(&path), Err(CoreError::Io(_))));
    }
}
