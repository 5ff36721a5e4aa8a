//! Error types for the watch collaborator and orchestrator.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ConfigurationError, TemplateError};

/// Errors from watcher construction and operation.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

impl WatchError {
    /// True for misconfiguration that no retry can fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WatchError::Configuration(_) | WatchError::Template(TemplateError::Configuration(_))
        )
    }
}
