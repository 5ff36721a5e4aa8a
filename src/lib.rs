//! Watch CSS module files and generate a companion file for each one.
//!
//! Every `*.cssm` file matched by the configured globs goes through
//! extract (class names), render (user template) and write (output file
//! beside the source or under an output directory).

#[macro_use]
pub mod logging;

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod importer;
pub mod pipeline;
pub mod template;
pub mod watcher;

pub use config::{LocalsConvention, Options, Settings, Template};
pub use error::{
    ConfigurationError, ExtractionError, ModuleLoadError, PipelineError, RenderError,
    TemplateError, WriteError,
};
pub use extract::{CssModuleExtractor, Extractor};
pub use importer::{DirectoryContext, ImportSource, ModuleContext, Theme, import_theme};
pub use pipeline::FileTransform;
pub use template::{Renderer, renderer_fn, resolve_template};
pub use watcher::{
    ChannelSource, NotifySource, Orchestrator, SessionSummary, WatchError, WatchEvent,
    WatchEventKind, WatchSource,
};
