//! The file transform pipeline: extract, deduplicate, render, write.
//!
//! One [`FileTransform`] is built per watch session. Its renderer and
//! options are shared read-only by every invocation of [`FileTransform::run`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexSet;
use tokio::sync::Mutex;

use crate::config::Options;
use crate::error::{PipelineError, TemplateError, WriteError};
use crate::extract::{CssModuleExtractor, Extractor};
use crate::template::{Renderer, resolve_template};

/// Turns one input file into one written output file.
pub struct FileTransform {
    options: Options,
    extractor: Arc<dyn Extractor>,
    renderer: Arc<dyn Renderer>,
    /// Per-input-path locks, only used with `serialize_writes`.
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileTransform {
    /// Resolve the template and build the default CSS module extractor.
    pub fn new(options: Options) -> Result<Self, TemplateError> {
        let renderer = resolve_template(&options.template, &options.working_directory)?;
        let extractor = Arc::new(CssModuleExtractor::new(
            options.working_directory.clone(),
            options.locals_convention,
        ));
        Ok(Self::with_parts(options, extractor, renderer))
    }

    /// Build from an already resolved renderer and a custom extractor.
    pub fn with_parts(
        options: Options,
        extractor: Arc<dyn Extractor>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            options,
            extractor,
            renderer,
            locks: DashMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Process `path` and return the path written to.
    ///
    /// Extraction, render and write failures propagate; nothing is written
    /// when extraction or rendering fails.
    pub async fn run(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        let _guard = if self.options.serialize_writes {
            Some(self.lock_for(path).lock_owned().await)
        } else {
            None
        };

        let keys = dedupe_keys(self.extractor.extract(path).await?);
        let content = self.renderer.render(path, &keys).await?;

        let output_name = derive_output_name(path, &self.options.extension);
        let out_file = derive_output_path(path, &self.options);

        crate::progress_event!(
            self.options.verbose,
            "pipeline",
            "writing",
            "{}",
            output_name.display()
        );

        tokio::fs::write(&out_file, content)
            .await
            .map_err(|source| WriteError {
                path: out_file.clone(),
                source,
            })?;

        Ok(out_file)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Remove repeated keys, keeping the first occurrence order.
pub fn dedupe_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Input directory and stem with `extension` in place of the old extension.
pub fn derive_output_name(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(extension);

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Final output location for `path`. Always absolute.
///
/// - With `output_directory`, the derived name is expressed relative to
///   the output directory and that relative path is resolved against the
///   working directory, the way a relative write lands in the process cwd.
///   `src/button.cssm` with `types` under `/proj` gives
///   `/proj/../src/button.d.ts`.
/// - Otherwise an absolute derived name is kept and a relative one is
///   joined onto the working directory.
pub fn derive_output_path(path: &Path, options: &Options) -> PathBuf {
    let wd = &options.working_directory;
    let name = derive_output_name(path, &options.extension);

    match &options.output_directory {
        Some(out_dir) => {
            let relative = relative_path(&absolutize(out_dir, wd), &absolutize(&name, wd));
            wd.join(relative)
        }
        None if name.is_absolute() => name,
        None => wd.join(name),
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Lexically remove `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Lexical path from `from` to `to`; both must be normalized.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, RenderError};
    use crate::template::renderer_fn;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::task::JoinSet;

    struct FixedExtractor(Vec<&'static str>);

    #[async_trait]
    impl Extractor for FixedExtractor {
        async fn extract(&self, _path: &Path) -> Result<Vec<String>, ExtractionError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl Extractor for FailingExtractor {
        async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
            Err(ExtractionError::Parse {
                path: path.to_path_buf(),
                reason: "boom".to_string(),
            })
        }
    }

    fn options(wd: &Path) -> Options {
        Options::default().working_directory(wd).extension(".d.ts")
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let keys = vec!["a", "b", "a", "c", "b"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe_keys(keys), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_derive_output_name() {
        assert_eq!(
            derive_output_name(Path::new("src/button.cssm"), ".d.ts"),
            PathBuf::from("src/button.d.ts")
        );
        assert_eq!(
            derive_output_name(Path::new("button.module.cssm"), ".ts"),
            PathBuf::from("button.module.ts")
        );
        assert_eq!(
            derive_output_name(Path::new("src/button.cssm"), ""),
            PathBuf::from("src/button")
        );
        assert_eq!(
            derive_output_name(Path::new("/abs/dir/x.cssm"), ".js"),
            PathBuf::from("/abs/dir/x.js")
        );
    }

    #[test]
    fn test_derive_output_path_relative_to_working_directory() {
        let opts = options(Path::new("/proj"));
        assert_eq!(
            derive_output_path(Path::new("src/button.cssm"), &opts),
            PathBuf::from("/proj/src/button.d.ts")
        );
    }

    #[test]
    fn test_derive_output_path_absolute_input() {
        let opts = options(Path::new("/proj"));
        assert_eq!(
            derive_output_path(Path::new("/other/card.cssm"), &opts),
            PathBuf::from("/other/card.d.ts")
        );
    }

    #[test]
    fn test_derive_output_path_is_relative_to_output_directory() {
        let opts = options(Path::new("/proj")).output_directory("types");
        assert_eq!(
            derive_output_path(Path::new("src/button.cssm"), &opts),
            PathBuf::from("/proj/../src/button.d.ts")
        );
        assert_eq!(
            derive_output_path(Path::new("/proj/src/button.cssm"), &opts),
            PathBuf::from("/proj/../src/button.d.ts")
        );

        let opts = options(Path::new("/proj")).output_directory("/proj/src");
        assert_eq!(
            derive_output_path(Path::new("src/nav/menu.cssm"), &opts),
            PathBuf::from("/proj/nav/menu.d.ts")
        );

        let opts = options(Path::new("/proj")).output_directory("/gen");
        assert_eq!(
            derive_output_path(Path::new("./a/../b.cssm"), &opts),
            PathBuf::from("/proj/../proj/b.d.ts")
        );
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/a/c/d")),
            PathBuf::from("../c/d")
        );
        assert_eq!(relative_path(Path::new("/a"), Path::new("/a")), PathBuf::new());
    }

    #[tokio::test]
    async fn test_run_dedupes_and_writes() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();

        let seen: Arc<StdMutex<Vec<Vec<String>>>> = Arc::default();
        let recorder = seen.clone();
        let renderer = renderer_fn(move |path, keys| {
            recorder.lock().unwrap().push(keys.to_vec());
            Ok(format!("{}:{}", path.display(), keys.join(",")))
        });

        let transform = FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FixedExtractor(vec!["a", "b", "a", "c"])),
            renderer,
        );

        let out = transform.run(Path::new("src/button.cssm")).await.unwrap();
        assert_eq!(out, temp.path().join("src/button.d.ts"));
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "src/button.cssm:a,b,c"
        );
        assert_eq!(seen.lock().unwrap().as_slice(), &[vec!["a", "b", "c"]]);
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let transform = FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FixedExtractor(vec!["x", "y"])),
            renderer_fn(|_, keys| Ok(keys.join("\n"))),
        );

        let first = transform.run(Path::new("x.cssm")).await.unwrap();
        let first_content = std::fs::read(&first).unwrap();
        let second = transform.run(Path::new("x.cssm")).await.unwrap();
        let second_content = std::fs::read(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_content, second_content);
    }

    #[tokio::test]
    async fn test_extraction_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let transform = FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FailingExtractor),
            renderer_fn(|_, _| Ok(String::new())),
        );

        let err = transform.run(Path::new("x.cssm")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert_eq!(err.stage(), "extract");
        assert!(!temp.path().join("x.d.ts").exists());
    }

    #[tokio::test]
    async fn test_render_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let transform = FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FixedExtractor(vec!["a"])),
            renderer_fn(|path, _| Err(RenderError::new(path, "bad template"))),
        );

        let err = transform.run(Path::new("x.cssm")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
        assert!(!temp.path().join("x.d.ts").exists());
    }

    #[tokio::test]
    async fn test_missing_output_directory_is_write_error() {
        let temp = TempDir::new().unwrap();
        let transform = FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FixedExtractor(vec!["a"])),
            renderer_fn(|_, _| Ok("content".to_string())),
        );

        let err = transform
            .run(Path::new("missing/dir/x.cssm"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Write(_)));
    }

    /// Renders `render-N`, N counting invocations, and records how many
    /// renders overlap.
    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render(&self, _file_path: &Path, _keys: &[String]) -> Result<String, RenderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("render-{n}"))
        }
    }

    const RUNS: usize = 4;

    async fn run_concurrently(transform: Arc<FileTransform>, path: &'static str) {
        let mut tasks = JoinSet::new();
        for _ in 0..RUNS {
            let transform = Arc::clone(&transform);
            tasks.spawn(async move { transform.run(Path::new(path)).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_unserialized_runs_overlap_and_last_write_wins() {
        let temp = TempDir::new().unwrap();
        let renderer = Arc::new(CountingRenderer::default());
        let transform = Arc::new(FileTransform::with_parts(
            options(temp.path()),
            Arc::new(FixedExtractor(vec!["a"])),
            renderer.clone(),
        ));

        run_concurrently(transform, "x.cssm").await;

        assert!(renderer.max_active.load(Ordering::SeqCst) > 1);
        let content = std::fs::read_to_string(temp.path().join("x.d.ts")).unwrap();
        let renders: Vec<String> = (0..RUNS).map(|n| format!("render-{n}")).collect();
        assert!(renders.contains(&content), "unexpected content {content:?}");
    }

    #[tokio::test]
    async fn test_serialized_runs_are_ordered_per_path() {
        let temp = TempDir::new().unwrap();
        let renderer = Arc::new(CountingRenderer::default());
        let transform = Arc::new(FileTransform::with_parts(
            options(temp.path()).serialize_writes(true),
            Arc::new(FixedExtractor(vec!["a"])),
            renderer.clone(),
        ));

        run_concurrently(Arc::clone(&transform), "x.cssm").await;

        assert_eq!(renderer.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), RUNS);
        // Each render happens under the lock, so the last one is written last
        assert_eq!(
            std::fs::read_to_string(temp.path().join("x.d.ts")).unwrap(),
            format!("render-{}", RUNS - 1)
        );

        transform.run(Path::new("y.cssm")).await.unwrap();
        assert_eq!(transform.locks.len(), 2);
    }
}
