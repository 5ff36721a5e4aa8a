//! Error types for the watch-extract-render-write pipeline.
//!
//! Construction failures (`ConfigurationError`, `ModuleLoadError`) are fatal
//! and surface before any file is watched. Per-file failures
//! (`ExtractionError`, `RenderError`, `WriteError`) only fail the invocation
//! that produced them.

use std::path::PathBuf;
use thiserror::Error;

/// Misconfiguration detected before a pipeline is built. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No options passed")]
    MissingOptions,

    #[error("Must provide a template file")]
    EmptyTemplate,

    #[error("No paths to watch")]
    NoPaths,

    #[error("Invalid watch pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A template given as a path could not be loaded.
#[derive(Error, Debug)]
pub enum ModuleLoadError {
    #[error("Cannot read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template {path} failed to compile: {reason}")]
    Compile { path: PathBuf, reason: String },
}

/// Failure while resolving the `template` option into a renderer.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),
}

/// The extraction collaborator failed for one file.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot extract keys from {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// The renderer failed for one file.
#[derive(Error, Debug)]
#[error("Render failed for {path}: {reason}")]
pub struct RenderError {
    pub path: PathBuf,
    pub reason: String,
}

impl RenderError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Writing the rendered output failed.
#[derive(Error, Debug)]
#[error("Cannot write {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Any failure of a single pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl PipelineError {
    /// Short label used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Extraction(_) => "extract",
            PipelineError::Render(_) => "render",
            PipelineError::Write(_) => "write",
        }
    }
}
