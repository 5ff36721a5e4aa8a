//! Write-settle tracking for raw file events.
//!
//! Editors and build tools often write a file in several steps. A path is
//! only reported once no event has touched it for the quiet period, so the
//! pipeline never reads a half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Holds paths until they have been quiet for the configured period.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending paths and the time of their latest event.
    pending: HashMap<PathBuf, Instant>,
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            quiet,
        }
    }

    /// Record activity on a path, restarting its quiet period.
    pub fn touch(&mut self, path: PathBuf) {
        self.touch_at(path, Instant::now());
    }

    fn touch_at(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    /// Stop tracking a path (e.g. it was removed).
    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Remove and return every path that has settled, oldest first.
    pub fn drain_settled(&mut self) -> Vec<PathBuf> {
        self.drain_settled_at(Instant::now())
    }

    fn drain_settled_at(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled = Vec::new();
        self.pending.retain(|path, last| {
            if now.duration_since(*last) >= self.quiet {
                settled.push((*last, path.clone()));
                false
            } else {
                true
            }
        });
        settled.sort();
        settled.into_iter().map(|(_, path)| path).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
