//! Template resolution.
//!
//! A [`Renderer`] turns a file path and its deduplicated keys into output
//! text. The `template` option resolves to one exactly once per pipeline:
//! - a renderer value is used as-is,
//! - a path names a MiniJinja template file that is loaded and compiled,
//! - `builtin:dts` selects the bundled TypeScript declaration renderer.
//!
//! A template file may export a `default` macro taking `(file_path, keys)`.
//! When present it is called; otherwise the whole template body is rendered
//! with `file_path`, `file_name` and `keys` in its context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use minijinja::{Environment, Value, context};

use crate::config::Template;
use crate::error::{ConfigurationError, ModuleLoadError, RenderError, TemplateError};
use crate::extract::camel_case;

/// Name of the bundled TypeScript declaration renderer.
pub const BUILTIN_DTS: &str = "builtin:dts";

const TEMPLATE_NAME: &str = "template";
const DEFAULT_EXPORT: &str = "default";

/// Renders output text for one file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, file_path: &Path, keys: &[String]) -> Result<String, RenderError>;
}

/// A renderer backed by a plain function.
pub struct FnRenderer<F> {
    func: F,
}

impl<F> FnRenderer<F>
where
    F: Fn(&Path, &[String]) -> Result<String, RenderError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Renderer for FnRenderer<F>
where
    F: Fn(&Path, &[String]) -> Result<String, RenderError> + Send + Sync,
{
    async fn render(&self, file_path: &Path, keys: &[String]) -> Result<String, RenderError> {
        (self.func)(file_path, keys)
    }
}

/// Wrap a function as a shareable renderer.
pub fn renderer_fn<F>(func: F) -> Arc<dyn Renderer>
where
    F: Fn(&Path, &[String]) -> Result<String, RenderError> + Send + Sync + 'static,
{
    Arc::new(FnRenderer::new(func))
}

/// A MiniJinja template loaded from disk.
pub struct TemplateFileRenderer {
    env: Environment<'static>,
}

impl TemplateFileRenderer {
    /// Read and compile the template at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ModuleLoadError> {
        let path = path.into();
        let source = std::fs::read_to_string(&path).map_err(|source| ModuleLoadError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_source(path, source)
    }

    /// Compile a template from source; `path` is only used for error reporting.
    pub fn from_source(path: impl Into<PathBuf>, source: String) -> Result<Self, ModuleLoadError> {
        let mut env = Environment::new();
        register_filters(&mut env);
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| ModuleLoadError::Compile {
                path: path.into(),
                reason: e.to_string(),
            })?;
        Ok(Self { env })
    }

    fn render_sync(&self, file_path: &Path, keys: &[String]) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(TEMPLATE_NAME)?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ctx = context! {
            file_path => file_path.to_string_lossy(),
            file_name => file_name,
            keys => keys,
        };

        let (body, state) = tmpl.render_and_return_state(ctx)?;
        if state.lookup(DEFAULT_EXPORT).is_some() {
            let args = [
                Value::from(file_path.to_string_lossy().into_owned()),
                Value::from(keys.to_vec()),
            ];
            state.call_macro(DEFAULT_EXPORT, &args)
        } else {
            Ok(body)
        }
    }
}

#[async_trait]
impl Renderer for TemplateFileRenderer {
    async fn render(&self, file_path: &Path, keys: &[String]) -> Result<String, RenderError> {
        self.render_sync(file_path, keys)
            .map_err(|e| RenderError::new(file_path, e.to_string()))
    }
}

fn register_filters(env: &mut Environment<'static>) {
    env.add_filter("camel_case", |value: String| camel_case(&value));
    env.add_filter("quote", |value: String| quote(&value));
}

/// Double-quote a string, escaping backslashes and quotes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// The bundled renderer: a TypeScript declaration of the style map.
pub fn typescript_declarations() -> Arc<dyn Renderer> {
    renderer_fn(|_path, keys| {
        let mut out = String::from("declare const styles: {\n");
        for key in keys {
            out.push_str(&format!("  readonly {}: string;\n", quote(key)));
        }
        out.push_str("};\nexport default styles;\n");
        Ok(out)
    })
}

/// Resolve the `template` option into a renderer.
///
/// Relative template paths are resolved against `working_directory`.
pub fn resolve_template(
    template: &Template,
    working_directory: &Path,
) -> Result<Arc<dyn Renderer>, TemplateError> {
    match template {
        Template::Renderer(renderer) => Ok(Arc::clone(renderer)),
        Template::Path(location) => {
            let location = location.trim();
            if location.is_empty() {
                return Err(ConfigurationError::EmptyTemplate.into());
            }
            if location == BUILTIN_DTS {
                return Ok(typescript_declarations());
            }

            let path = Path::new(location);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                working_directory.join(path)
            };
            crate::debug_event!("template", "loading", "{}", path.display());
            Ok(Arc::new(TemplateFileRenderer::load(path)?))
        }
    }
}
