//! Tab error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabError {
    #[error("Tab not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tab controller for context {0} was unloaded")]
    Unloaded(String),

    #[error("Tab container error: {0}")]
    Container(String),

    #[error("No replacement found among {visible} visible tabs (from index {index})")]
    SelectorExhausted { visible: usize, index: usize },
}
