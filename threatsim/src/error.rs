// src/error.rs
//
// Error types for the environment, its configuration, and intel feed loading.
//
// Sequencing and action errors are reported before any episode state is
// touched, so callers can retry with a corrected request.

use thiserror::Error;

/// Errors returned by `reset`/`step` style calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Raw action index is not a member of the role's action set.
    #[error("invalid {role} action {value}: expected 0..{cardinality}")]
    InvalidAction {
        role: &'static str,
        value: i64,
        cardinality: usize,
    },
    /// `step` called before the first `reset`.
    #[error("step called before reset")]
    NotReset,
    /// `step` called after the episode reached its terminal state.
    #[error("episode already done after {steps} steps; call reset")]
    EpisodeDone { steps: u64 },
    /// Construction rejected the configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration validation and loading errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("config field '{field}' is invalid: {message}")]
    Invalid { field: String, message: String },
    #[error("failed to read config file '{path}': {message}")]
    Io { path: String, message: String },
    #[error("failed to parse config YAML: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Intel feed loading errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("failed to read intel feed '{path}': {message}")]
    Io { path: String, message: String },
    #[error("intel feed is not a JSON array of threat records: {0}")]
    Parse(String),
    #[error("no threats_*.json file found in '{0}'")]
    NoFeedFiles(String),
}
