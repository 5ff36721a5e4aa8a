//! Watch command.

use crate::cli::args::WatchArgs;
use crate::config::{Options, Settings, Template};
use crate::watcher::{NotifySource, Orchestrator, SessionSummary, WatchError};

/// Layer command-line flags over the `[watch]` settings.
pub fn build_options(settings: &Settings, args: &WatchArgs, verbose: bool) -> Options {
    let mut options = settings.watch.to_options();

    if !args.paths.is_empty() {
        options.paths = args.paths.clone();
    }
    if let Some(template) = &args.template {
        options.template = Template::Path(template.clone());
    }
    if let Some(dir) = &args.out_dir {
        options.output_directory = Some(dir.clone());
    }
    if let Some(ext) = &args.extension {
        options.extension = ext.clone();
    }
    if let Some(cwd) = &args.cwd {
        options.working_directory = cwd.clone();
    }
    if let Some(convention) = args.convention {
        options.locals_convention = convention;
    }

    options.verbose |= verbose;
    options.persistent &= !args.once;
    options
}

/// Run the watch session until the source closes (one-shot) or the
/// process is interrupted.
pub async fn run_watch(options: Options) -> Result<SessionSummary, WatchError> {
    let orchestrator = Orchestrator::new(Some(options))?;

    tokio::select! {
        result = orchestrator.run(NotifySource::new()) => result,
        _ = tokio::signal::ctrl_c() => {
            crate::log_event!("watcher", "interrupted");
            Ok(SessionSummary::default())
        }
    }
}
