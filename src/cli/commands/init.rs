//! `init` and `config` commands.

use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::config::Settings;

/// Write the default settings file under `root`.
///
/// An existing file is only replaced with `force`.
pub fn run_init(root: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = Settings::init_config_file(root, force).map_err(|e| anyhow!("{e}"))?;
    crate::debug_event!("config", "created", "{}", path.display());
    Ok(path)
}

/// The effective settings as TOML.
pub fn render_config(settings: &Settings) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp = TempDir::new().unwrap();

        let path = run_init(temp.path(), false).unwrap();
        assert!(path.is_file());

        let err = run_init(temp.path(), false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        assert_eq!(run_init(temp.path(), true).unwrap(), path);
    }

    #[test]
    fn test_render_config() {
        let rendered = render_config(&Settings::default()).unwrap();
        assert!(rendered.contains("[watch]"));
        assert!(rendered.contains("template = \"builtin:dts\""));
        assert!(rendered.contains("[logging]"));
    }
}
