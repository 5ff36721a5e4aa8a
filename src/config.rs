//! Configuration for the watch pipeline.
//!
//! Two layers live here:
//! - [`Options`], the immutable per-pipeline configuration. It can carry a
//!   renderer value directly, so it is built in code.
//! - [`Settings`], the layered file configuration (defaults, TOML file,
//!   environment variables) that the CLI turns into [`Options`].
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CSSM_` and use double
//! underscores to separate nested levels:
//! - `CSSM_WATCH__EXTENSION=.d.ts` sets `watch.extension`
//! - `CSSM_WATCH__PERSISTENT=false` sets `watch.persistent`
//! - `CSSM_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::template::Renderer;

/// Directory holding the settings file, searched from the current directory upwards.
pub const CONFIG_DIR: &str = ".cssm-watch";
/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

/// Key-casing policy handed to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalsConvention {
    #[default]
    #[serde(alias = "as-is")]
    AsIs,
    #[serde(alias = "camel-case")]
    CamelCase,
    #[serde(alias = "camel-case-only")]
    CamelCaseOnly,
}

impl std::str::FromStr for LocalsConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asIs" | "as-is" => Ok(Self::AsIs),
            "camelCase" | "camel-case" => Ok(Self::CamelCase),
            "camelCaseOnly" | "camel-case-only" => Ok(Self::CamelCaseOnly),
            other => Err(format!(
                "unknown locals convention '{other}' (expected asIs, camelCase or camelCaseOnly)"
            )),
        }
    }
}

/// The `template` option: a renderer value, or a template file to load once at startup.
#[derive(Clone)]
pub enum Template {
    Renderer(Arc<dyn Renderer>),
    Path(String),
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Renderer(_) => f.write_str("Template::Renderer(..)"),
            Template::Path(p) => f.debug_tuple("Template::Path").field(p).finish(),
        }
    }
}

impl Default for Template {
    fn default() -> Self {
        Template::Path(String::new())
    }
}

impl From<Arc<dyn Renderer>> for Template {
    fn from(renderer: Arc<dyn Renderer>) -> Self {
        Template::Renderer(renderer)
    }
}

impl From<&str> for Template {
    fn from(path: &str) -> Self {
        Template::Path(path.to_string())
    }
}

impl From<String> for Template {
    fn from(path: String) -> Self {
        Template::Path(path)
    }
}

/// Configuration for one pipeline instance. Immutable once the pipeline is built.
#[derive(Debug, Clone)]
pub struct Options {
    /// Base for relative output paths and relative template paths.
    pub working_directory: PathBuf,
    pub locals_convention: LocalsConvention,
    pub template: Template,
    /// When set, output paths are expressed relative to this directory.
    pub output_directory: Option<PathBuf>,
    /// Replaces the input file's extension. Empty drops it.
    pub extension: String,
    pub verbose: bool,
    /// Keep watching after the initial scan.
    pub persistent: bool,
    /// Path or glob patterns to watch.
    pub paths: Vec<String>,
    /// How long a file must be quiet before its event is emitted.
    pub debounce_ms: u64,
    /// Serialize pipeline runs per input path.
    pub serialize_writes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            working_directory: current_dir(),
            locals_convention: LocalsConvention::default(),
            template: Template::default(),
            output_directory: None,
            extension: String::new(),
            verbose: false,
            persistent: false,
            paths: Vec::new(),
            debounce_ms: default_debounce_ms(),
            serialize_writes: false,
        }
    }
}

impl Options {
    pub fn new(paths: impl IntoIterator<Item = impl Into<String>>, template: impl Into<Template>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn locals_convention(mut self, convention: LocalsConvention) -> Self {
        self.locals_convention = convention;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn serialize_writes(mut self, serialize: bool) -> Self {
        self.serialize_writes = serialize;
        self
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Layered file configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `[watch]` table: every [`Options`] field that can be written down.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchSettings {
    #[serde(default)]
    pub paths: Vec<String>,

    /// Template file path, or `builtin:dts`.
    #[serde(default)]
    pub template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,

    #[serde(default)]
    pub extension: String,

    #[serde(default)]
    pub locals_convention: LocalsConvention,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_true")]
    pub persistent: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub serialize_writes: bool,
}

/// The `[logging]` table.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `cssm_watch::pipeline = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            paths: vec!["src/**/*.cssm".to_string()],
            template: "builtin:dts".to_string(),
            working_directory: None,
            output_directory: None,
            extension: ".d.ts".to_string(),
            locals_convention: LocalsConvention::default(),
            verbose: false,
            persistent: true,
            debounce_ms: default_debounce_ms(),
            serialize_writes: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchSettings {
    /// Build pipeline options. The template stays a path to be resolved later.
    pub fn to_options(&self) -> Options {
        Options {
            working_directory: self.working_directory.clone().unwrap_or_else(current_dir),
            locals_convention: self.locals_convention,
            template: Template::Path(self.template.clone()),
            output_directory: self.output_directory.clone(),
            extension: self.extension.clone(),
            verbose: self.verbose,
            persistent: self.persistent,
            paths: self.paths.clone(),
            debounce_ms: self.debounce_ms,
            serialize_writes: self.serialize_writes,
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring `CSSM_` variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore stays in the name
            .merge(
                Env::prefixed("CSSM_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for the config directory in ancestors.
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the directory containing the config directory, if any.
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root`.
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.template, "builtin:dts");
        assert_eq!(settings.watch.extension, ".d.ts");
        assert!(settings.watch.persistent);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[watch]
paths = ["styles/*.cssm", "components/**/*.cssm"]
template = "templates/dts.jinja"
output_directory = "generated"
locals_convention = "camelCaseOnly"
persistent = false

[logging]
default = "info"

[logging.modules]
"cssm_watch::pipeline" = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watch.paths.len(), 2);
        assert_eq!(settings.watch.template, "templates/dts.jinja");
        assert_eq!(
            settings.watch.output_directory,
            Some(PathBuf::from("generated"))
        );
        assert_eq!(
            settings.watch.locals_convention,
            LocalsConvention::CamelCaseOnly
        );
        assert!(!settings.watch.persistent);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["cssm_watch::pipeline"], "debug");
        // Untouched keys keep their defaults
        assert_eq!(settings.watch.extension, ".d.ts");
    }

    #[test]
    fn test_kebab_case_convention_alias() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[watch]\nlocals_convention = \"camel-case\"\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watch.locals_convention, LocalsConvention::CamelCase);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[watch]\ndebounce_ms = 50\n").unwrap();

        unsafe {
            std::env::set_var("CSSM_WATCH__DEBOUNCE_MS", "250");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("CSSM_WATCH__DEBOUNCE_MS");
        }

        assert_eq!(settings.watch.debounce_ms, 250);
    }

    #[test]
    fn test_save_and_init() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".cssm-watch/settings.toml"));
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());

        let mut settings = Settings::load_from(&path).unwrap();
        settings.watch.extension = ".ts".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.watch.extension, ".ts");
    }

    #[test]
    fn test_to_options() {
        let watch = WatchSettings {
            working_directory: Some(PathBuf::from("/proj")),
            ..WatchSettings::default()
        };
        let options = watch.to_options();
        assert_eq!(options.working_directory, PathBuf::from("/proj"));
        assert_eq!(options.extension, ".d.ts");
        assert!(matches!(options.template, Template::Path(ref p) if p == "builtin:dts"));
    }

    #[test]
    fn test_convention_from_str() {
        assert_eq!("asIs".parse::<LocalsConvention>(), Ok(LocalsConvention::AsIs));
        assert_eq!(
            "camel-case-only".parse::<LocalsConvention>(),
            Ok(LocalsConvention::CamelCaseOnly)
        );
        assert!("snake".parse::<LocalsConvention>().is_err());
    }
}
