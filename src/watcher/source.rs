//! Watch sources: where `add`/`change` events come from.
//!
//! [`NotifySource`] scans the configured globs once, then (when persistent)
//! follows file system notifications. [`ChannelSource`] forwards events
//! sent by the caller, for embedding and tests.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use indexmap::IndexSet;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::debouncer::Debouncer;
use super::error::WatchError;
use crate::error::ConfigurationError;

const CHANNEL_CAPACITY: usize = 256;
const MAX_TICK: Duration = Duration::from_millis(50);

/// Kind of file event delivered to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
}

/// One file event. `path` is relative to `cwd` when the file lies under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Add,
            path: path.into(),
        }
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Change,
            path: path.into(),
        }
    }
}

/// How a source should watch.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Path or glob patterns; relative ones are resolved against `cwd`.
    pub patterns: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Keep running after the initial scan.
    pub persistent: bool,
    /// Quiet period before a written file is reported.
    pub debounce: Duration,
}

/// Produces file events. The stream ends when the receiver yields `None`.
pub trait WatchSource: Send {
    /// Start watching. Must be called within a Tokio runtime.
    fn start(&mut self, config: WatchConfig) -> Result<mpsc::Receiver<WatchEvent>, WatchError>;
}

/// Events pushed by the caller through a channel.
pub struct ChannelSource {
    rx: Option<mpsc::Receiver<WatchEvent>>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::Sender<WatchEvent>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (tx, Self { rx: Some(rx) })
    }
}

impl WatchSource for ChannelSource {
    fn start(&mut self, _config: WatchConfig) -> Result<mpsc::Receiver<WatchEvent>, WatchError> {
        self.rx.take().ok_or_else(|| WatchError::InitFailed {
            reason: "channel source already started".to_string(),
        })
    }
}

/// File system source backed by `glob` for scanning and `notify` for changes.
#[derive(Debug, Default)]
pub struct NotifySource;

impl NotifySource {
    pub fn new() -> Self {
        Self
    }
}

impl WatchSource for NotifySource {
    fn start(&mut self, config: WatchConfig) -> Result<mpsc::Receiver<WatchEvent>, WatchError> {
        let cwd = match &config.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().map_err(|e| WatchError::InitFailed {
                reason: format!("cannot determine current directory: {e}"),
            })?,
        };

        let matcher = PatternSet::new(&config.patterns, &cwd)?;
        let initial = matcher.scan();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        if !config.persistent {
            let tick = config.debounce.clamp(Duration::from_millis(1), MAX_TICK);
            tokio::spawn(settle_scan(initial, config.debounce, tick, tx, cwd));
            return Ok(rx);
        }

        let (raw_tx, raw_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.blocking_send(res);
        })?;

        watch_roots(&matcher.roots(), |root| {
            watcher.watch(root, RecursiveMode::Recursive)
        })?;

        let follow = Follow {
            _watcher: watcher,
            raw_rx,
            tx,
            matcher,
            debouncer: Debouncer::new(config.debounce),
            tick: config.debounce.clamp(Duration::from_millis(1), MAX_TICK),
            cwd,
        };
        tokio::spawn(follow.run(initial));

        Ok(rx)
    }
}

/// State of a persistent watch after the initial scan.
struct Follow {
    /// Keeps the OS watch alive for the task's lifetime.
    _watcher: notify::RecommendedWatcher,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    tx: mpsc::Sender<WatchEvent>,
    matcher: PatternSet,
    debouncer: Debouncer,
    tick: Duration,
    cwd: PathBuf,
}

impl Follow {
    async fn run(mut self, initial: Vec<PathBuf>) {
        // Scanned files settle like written ones and are reported as adds
        let mut known: HashSet<PathBuf> = HashSet::new();
        for path in initial {
            self.debouncer.touch(path);
        }

        let mut ticker = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                res = self.raw_rx.recv() => match res {
                    Some(Ok(event)) => self.record(event, &mut known),
                    Some(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                    None => break,
                },

                _ = ticker.tick() => {
                    for path in self.debouncer.drain_settled() {
                        if !path.is_file() {
                            known.remove(&path);
                            continue;
                        }
                        let kind = if known.insert(path.clone()) {
                            WatchEventKind::Add
                        } else {
                            WatchEventKind::Change
                        };
                        if emit(&self.tx, &self.cwd, kind, &path).await.is_err() {
                            return;
                        }
                    }
                }

                _ = self.tx.closed() => break,
            }
        }

        crate::debug_event!("watcher", "stopped");
    }

    fn record(&mut self, event: Event, known: &mut HashSet<PathBuf>) {
        for path in event.paths {
            if !self.matcher.matches(&path) {
                continue;
            }
            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => self.debouncer.touch(path),
                EventKind::Remove(_) => {
                    self.debouncer.forget(&path);
                    known.remove(&path);
                }
                _ => {}
            }
        }
    }
}

/// Size and modification time; a change means the file is still being written.
type Stamp = Option<(u64, Option<SystemTime>)>;

fn stamp(path: &Path) -> Stamp {
    std::fs::metadata(path)
        .ok()
        .map(|meta| (meta.len(), meta.modified().ok()))
}

/// Report scanned files as adds once each has stopped changing for `quiet`,
/// then close the stream.
async fn settle_scan(
    initial: Vec<PathBuf>,
    quiet: Duration,
    tick: Duration,
    tx: mpsc::Sender<WatchEvent>,
    cwd: PathBuf,
) {
    let mut debouncer = Debouncer::new(quiet);
    let mut stamps: HashMap<PathBuf, Stamp> = HashMap::new();
    for path in initial {
        stamps.insert(path.clone(), stamp(&path));
        debouncer.touch(path);
    }

    let mut ticker = tokio::time::interval(tick);
    while !debouncer.is_idle() {
        ticker.tick().await;

        for (path, last) in stamps.iter_mut() {
            let current = stamp(path);
            if current != *last {
                *last = current;
                debouncer.touch(path.clone());
            }
        }

        for path in debouncer.drain_settled() {
            stamps.remove(&path);
            if !path.is_file() {
                continue;
            }
            if emit(&tx, &cwd, WatchEventKind::Add, &path).await.is_err() {
                return;
            }
        }
    }
}

/// Watch every root. Failing some roots degrades the session; failing all
/// of them is an error.
fn watch_roots(
    roots: &[PathBuf],
    mut watch: impl FnMut(&Path) -> notify::Result<()>,
) -> Result<(), WatchError> {
    let mut first_failure = None;
    let mut watched = 0usize;

    for root in roots {
        match watch(root) {
            Ok(()) => {
                watched += 1;
                crate::debug_event!("watcher", "watching", "{}", root.display());
            }
            Err(e) => {
                let err = WatchError::PathWatchFailed {
                    path: root.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!("[watcher] {err}");
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        Some(err) if watched == 0 => Err(err),
        _ => Ok(()),
    }
}

async fn emit(
    tx: &mpsc::Sender<WatchEvent>,
    cwd: &Path,
    kind: WatchEventKind,
    path: &Path,
) -> Result<(), mpsc::error::SendError<WatchEvent>> {
    tx.send(WatchEvent {
        kind,
        path: display_path(path, cwd),
    })
    .await
}

fn display_path(path: &Path, cwd: &Path) -> PathBuf {
    path.strip_prefix(cwd)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Compiled watch patterns, all absolute.
struct PatternSet {
    entries: Vec<(String, glob::Pattern)>,
}

impl PatternSet {
    fn new(patterns: &[String], cwd: &Path) -> Result<Self, WatchError> {
        if patterns.is_empty() {
            return Err(ConfigurationError::NoPaths.into());
        }

        let mut entries = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let absolute = absolute_pattern(pattern, cwd);
            let compiled =
                glob::Pattern::new(&absolute).map_err(|e| ConfigurationError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            entries.push((absolute, compiled));
        }
        Ok(Self { entries })
    }

    fn matches(&self, path: &Path) -> bool {
        self.entries.iter().any(|(_, p)| p.matches_path(path))
    }

    /// Every existing file matching a pattern, in pattern then glob order.
    fn scan(&self) -> Vec<PathBuf> {
        let mut found = IndexSet::new();
        for (pattern, _) in &self.entries {
            match glob::glob(pattern) {
                Ok(paths) => {
                    for entry in paths {
                        match entry {
                            Ok(path) if path.is_file() => {
                                found.insert(path);
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("[watcher] cannot read {}: {e}", e.path().display()),
                        }
                    }
                }
                Err(e) => tracing::warn!("[watcher] bad pattern {pattern}: {e}"),
            }
        }
        found.into_iter().collect()
    }

    /// Directories to watch: the literal prefix of each pattern.
    fn roots(&self) -> Vec<PathBuf> {
        let mut roots = IndexSet::new();
        for (pattern, _) in &self.entries {
            let mut root = literal_prefix(Path::new(pattern));
            while !root.is_dir() {
                if !root.pop() {
                    break;
                }
            }
            if !root.as_os_str().is_empty() {
                roots.insert(root);
            }
        }
        // Nested roots are covered by their recursive ancestor
        let all: Vec<PathBuf> = roots.into_iter().collect();
        all.iter()
            .filter(|root| !all.iter().any(|other| other != *root && root.starts_with(other)))
            .cloned()
            .collect()
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Resolve a pattern against `cwd`; a plain directory means every file below it.
fn absolute_pattern(pattern: &str, cwd: &Path) -> String {
    let path = Path::new(pattern);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    if !has_glob_meta(pattern) && path.is_dir() {
        return path.join("**").join("*").to_string_lossy().into_owned();
    }
    path.to_string_lossy().into_owned()
}

/// Leading components of a pattern that contain no glob syntax.
fn literal_prefix(pattern: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in pattern.components() {
        if let Component::Normal(part) = component
            && has_glob_meta(&part.to_string_lossy())
        {
            break;
        }
        prefix.push(component.as_os_str());
    }
    prefix
}
