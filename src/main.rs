//! cssm-watch command-line entry point.

use clap::Parser;

use cssm_watch::cli::commands::{init, watch};
use cssm_watch::cli::{Cli, Commands};
use cssm_watch::config::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let verbose = cli.verbose || settings.watch.verbose;
    cssm_watch::logging::init_with_config(&settings.logging, verbose);

    match cli.command {
        Commands::Init { force } => {
            let root = std::env::current_dir()?;
            match init::run_init(&root, force) {
                Ok(path) => println!("Created configuration file at: {}", path.display()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config => print!("{}", init::render_config(&settings)?),

        Commands::Watch(args) => {
            let options = watch::build_options(&settings, &args, cli.verbose);
            match watch::run_watch(options).await {
                Ok(summary) if summary.failed.is_empty() => {}
                Ok(summary) => {
                    eprintln!("{} file(s) failed", summary.failed.len());
                    std::process::exit(2);
                }
                Err(e) if e.is_configuration() => {
                    tracing::warn!("[config] {e}");
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
