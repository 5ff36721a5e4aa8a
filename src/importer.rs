//! Theme importer: collect CSS module locals into one theme map.
//!
//! The input is either a ready theme (component name to component) or a
//! keyed module context, e.g. every `*.cssm` file of a directory. Context
//! keys are normalized to their base name without directory or `.cssm`
//! suffix; later keys overwrite earlier ones with the same base name.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use walkdir::WalkDir;

use crate::config::LocalsConvention;
use crate::error::ExtractionError;
use crate::extract::{apply_convention, extract_locals};

/// Class name to exported value.
pub type Component = IndexMap<String, String>;
/// Component name to component.
pub type Theme = IndexMap<String, Component>;

/// A set of modules that can be enumerated and looked up by key.
pub trait ModuleContext {
    fn keys(&self) -> Vec<String>;

    /// `Ok(None)` when the key names no module; `Err` when it does but the
    /// module cannot be loaded.
    fn get(&self, key: &str) -> Result<Option<Component>, ExtractionError>;
}

/// What the importer accepts.
pub enum ImportSource<'a> {
    Theme(Theme),
    Context(&'a dyn ModuleContext),
}

fn key_regex() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^(?:.*/)?([^/]*)\.cssm$").expect("valid key regex"))
}

/// Strip the directory prefix and `.cssm` suffix from a module key.
///
/// A key without any `/` keeps its first character (`card.cssm` is `card`).
/// Keys without the suffix are returned unchanged.
pub fn normalize_key(raw: &str) -> String {
    match key_regex().captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    }
}

/// Build a theme from a context.
///
/// Keys whose lookup yields no module are skipped. The first module that
/// fails to load aborts the import.
pub fn collect_theme(ctx: &dyn ModuleContext) -> Result<Theme, ExtractionError> {
    let mut theme = Theme::new();
    for key in ctx.keys() {
        match ctx.get(&key)? {
            Some(component) => {
                theme.insert(normalize_key(&key), component);
            }
            None => crate::debug_event!("importer", "missing module", "{key}"),
        }
    }
    Ok(theme)
}

/// Normalize `source` and hand the theme to `aggregate`.
///
/// `aggregate` is not called when a context module fails to load.
pub fn import_theme<R>(
    source: ImportSource<'_>,
    aggregate: impl FnOnce(Theme) -> R,
) -> Result<R, ExtractionError> {
    let theme = match source {
        ImportSource::Theme(theme) => theme,
        ImportSource::Context(ctx) => collect_theme(ctx)?,
    };
    Ok(aggregate(theme))
}

/// Every `*.cssm` file below a directory, keyed `./relative/path.cssm`.
///
/// Looking a key up extracts the file's locals and maps each to itself.
pub struct DirectoryContext {
    root: PathBuf,
    locals_convention: LocalsConvention,
}

impl DirectoryContext {
    pub fn new(root: impl Into<PathBuf>, locals_convention: LocalsConvention) -> Self {
        Self {
            root: root.into(),
            locals_convention,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches("./"))
    }

    fn load(&self, path: &Path) -> Result<Component, ExtractionError> {
        let source = std::fs::read_to_string(path).map_err(|source| ExtractionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let locals = extract_locals(&source).map_err(|reason| ExtractionError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(apply_convention(locals, self.locals_convention)
            .into_iter()
            .map(|name| (name.clone(), name))
            .collect())
    }
}

impl ModuleContext for DirectoryContext {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "cssm"))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(format!("./{}", parts.join("/")))
            })
            .collect();
        keys.sort();
        keys
    }

    fn get(&self, key: &str) -> Result<Option<Component>, ExtractionError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        self.load(&path).map(Some)
    }
}
