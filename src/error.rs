//! Error handling module for the Harbor replicator

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("Command `{command}` timed out after {}", display_duration(.timeout))]
    CommandTimeout { command: String, timeout: Duration },
    #[error("Command `{command}` was cancelled")]
    CommandCancelled { command: String },
    #[error("Login to {registry} failed: {source}")]
    Login {
        registry: String,
        #[source]
        source: Box<ReplicatorError>,
    },
}

impl ReplicatorError {
    /// True for failures caused by the runner stopping the process.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            ReplicatorError::CommandTimeout { .. } | ReplicatorError::CommandCancelled { .. }
        )
    }
}

impl From<serde_json::Error> for ReplicatorError {
    fn from(err: serde_json::Error) -> Self {
        ReplicatorError::Parse(err.to_string())
    }
}

fn display_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

pub type Result<T> = std::result::Result<T, ReplicatorError>;
