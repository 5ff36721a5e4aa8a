//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::LocalsConvention;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Generate typings for CSS module files as they change
#[derive(Parser)]
#[command(
    name = "cssm-watch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Generate a companion file for every CSS module",
    long_about = "Watch *.cssm files, extract their class names and render a template \
                  (TypeScript declarations by default) next to each one.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every file as it is transformed
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Transform matching files and keep watching
    #[command(about = "Transform CSS modules, then follow changes")]
    Watch(WatchArgs),

    /// Initialize project
    #[command(about = "Set up .cssm-watch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration
    #[command(about = "Display active settings")]
    Config,
}

/// Flags of the `watch` command. Anything left unset falls back to settings.toml.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct WatchArgs {
    /// Glob patterns or directories to watch
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,

    /// Template file, or `builtin:dts`
    #[arg(short, long)]
    pub template: Option<String>,

    /// Write outputs under this directory instead of beside their sources
    #[arg(short, long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Output file extension, e.g. `.d.ts`
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extension: Option<String>,

    /// Directory patterns and relative paths are resolved against
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Key casing: asIs, camelCase or camelCaseOnly
    #[arg(long, value_name = "CONVENTION")]
    pub convention: Option<LocalsConvention>,

    /// Transform once and exit instead of watching
    #[arg(long)]
    pub once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::try_parse_from([
            "cssm-watch",
            "--verbose",
            "watch",
            "src/**/*.cssm",
            "lib",
            "--template",
            "typings.jinja",
            "--out-dir",
            "types",
            "--ext",
            ".ts",
            "--convention",
            "camel-case-only",
            "--once",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Watch(args) = cli.command else {
            panic!("expected watch command");
        };
        assert_eq!(args.paths, vec!["src/**/*.cssm", "lib"]);
        assert_eq!(args.template.as_deref(), Some("typings.jinja"));
        assert_eq!(args.out_dir, Some(PathBuf::from("types")));
        assert_eq!(args.extension.as_deref(), Some(".ts"));
        assert_eq!(args.convention, Some(LocalsConvention::CamelCaseOnly));
        assert!(args.once);
    }

    #[test]
    fn test_unknown_convention_is_rejected() {
        let result = Cli::try_parse_from(["cssm-watch", "watch", "--convention", "snake"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["cssm-watch", "init", "--force", "-c", "custom.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }
}
