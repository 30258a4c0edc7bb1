//! Error types for the context autopilot
//!
//! Component boundaries never propagate these as panics: background work turns
//! them into [`crate::autopilot::AutopilotEvent`]s, and provider failures select
//! the local fallback for the failing call only.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Version control error: {0}")]
    VersionControl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContextError {
    /// Build an extraction error for a path
    pub fn extraction(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<notify::Error> for ContextError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher(err.to_string())
    }
}

/// Errors raised by the optional embedding and summarization providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured")]
    NotConfigured,
}
