//! Binds the file transform pipeline to watch events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::error::WatchError;
use super::source::{WatchConfig, WatchEvent, WatchSource};
use crate::config::Options;
use crate::error::{ConfigurationError, PipelineError};
use crate::pipeline::FileTransform;

/// Outcome counts of a finished watch session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Output paths written, in completion order.
    pub written: Vec<PathBuf>,
    /// Input paths whose invocation failed.
    pub failed: Vec<PathBuf>,
}

/// Runs one pipeline invocation per `add`/`change` event.
///
/// The template is resolved once, when the orchestrator is built.
/// Invocations are independent: events for the same path are neither
/// coalesced nor ordered unless `serialize_writes` is set.
pub struct Orchestrator {
    transform: Arc<FileTransform>,
}

impl Orchestrator {
    /// Validate options and resolve the template.
    ///
    /// Missing options, an empty template or an unloadable template file
    /// fail here, before any watch is started.
    pub fn new(options: Option<Options>) -> Result<Self, WatchError> {
        let options = options.ok_or(ConfigurationError::MissingOptions)?;
        if options.paths.is_empty() {
            return Err(ConfigurationError::NoPaths.into());
        }

        crate::progress_event!(
            options.verbose,
            "watcher",
            if options.persistent {
                "watching"
            } else {
                "transforming"
            },
            "{}",
            options.paths.join(", ")
        );

        let transform = FileTransform::new(options)?;
        Ok(Self::with_transform(transform))
    }

    /// Use an already built pipeline.
    pub fn with_transform(transform: FileTransform) -> Self {
        Self {
            transform: Arc::new(transform),
        }
    }

    pub fn transform(&self) -> &FileTransform {
        &self.transform
    }

    /// What the watch source is asked to do.
    pub fn watch_config(&self) -> WatchConfig {
        let options = self.transform.options();
        WatchConfig {
            patterns: options.paths.clone(),
            cwd: Some(options.working_directory.clone()),
            persistent: options.persistent,
            debounce: Duration::from_millis(options.debounce_ms),
        }
    }

    /// Run the session until the source closes and every in-flight
    /// invocation has finished.
    ///
    /// Per-file failures are logged and counted; they never end the session.
    pub async fn run<S: WatchSource>(&self, mut source: S) -> Result<SessionSummary, WatchError> {
        let mut events = source.start(self.watch_config())?;
        let mut tasks: JoinSet<(WatchEvent, Result<PathBuf, PipelineError>)> = JoinSet::new();
        let mut summary = SessionSummary::default();

        crate::log_event!("watcher", "started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        crate::debug_event!("watcher", "event", "{:?} {}", event.kind, event.path.display());
                        let transform = Arc::clone(&self.transform);
                        tasks.spawn(async move {
                            let result = transform.run(&event.path).await;
                            (event, result)
                        });
                    }
                    None => break,
                },

                Some(joined) = tasks.join_next() => self.record(joined, &mut summary),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.record(joined, &mut summary);
        }

        crate::log_event!(
            "watcher",
            "finished",
            "{} written, {} failed",
            summary.written.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn record(
        &self,
        joined: Result<(WatchEvent, Result<PathBuf, PipelineError>), tokio::task::JoinError>,
        summary: &mut SessionSummary,
    ) {
        match joined {
            Ok((_, Ok(out_file))) => {
                crate::debug_event!("pipeline", "written", "{}", out_file.display());
                summary.written.push(out_file);
            }
            Ok((event, Err(e))) => {
                tracing::error!(
                    "[pipeline] {} failed for {}: {e}",
                    e.stage(),
                    event.path.display()
                );
                summary.failed.push(event.path);
            }
            Err(e) => {
                tracing::error!("[pipeline] invocation aborted: {e}");
            }
        }
    }
}
