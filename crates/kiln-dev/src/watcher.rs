//! Recursive source watcher with per-path debouncing.
//!
//! Changes under ignored directories, matching `*.ext` patterns or inside hidden
//! files and directories never reach the receiver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{DevError, Result};

/// A single change below the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Keeps the underlying `notify` watcher alive; dropping it stops the stream.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to watch
    /// * `ignore` - Directory names or `*.ext` patterns relative to `root`
    /// * `debounce_ms` - Window in which repeated events for one path are dropped
    ///
    /// # Errors
    ///
    /// Returns [`DevError::FileNotFound`] if `root` does not exist and
    /// [`DevError::Watch`] if the platform watcher cannot be installed.
    pub fn new(
        root: PathBuf,
        ignore: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(DevError::FileNotFound(root));
        }
        // notify reports canonical paths on some platforms
        let root = std::fs::canonicalize(&root)?;

        let (tx, rx) = mpsc::channel(100);
        let debounce = Duration::from_millis(debounce_ms);
        let mut recent: HashMap<PathBuf, Instant> = HashMap::new();
        let filter_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "file watcher error");
                    return;
                }
            };

            for path in &event.paths {
                if should_ignore(path, &filter_root, &ignore) {
                    continue;
                }

                let now = Instant::now();
                if recent
                    .get(path)
                    .is_some_and(|last| now.duration_since(*last) < debounce)
                {
                    continue;
                }
                recent.insert(path.clone(), now);
                recent.retain(|_, seen| now.duration_since(*seen) < debounce);

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                // Receiver gone means the session was dropped
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching for changes");

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Whether a change at `path` should be dropped.
pub(crate) fn should_ignore(path: &Path, root: &Path, ignore: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };

    let relative_str = relative.to_string_lossy();

    for pattern in ignore {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if relative_str.ends_with(suffix) {
                return true;
            }
            continue;
        }

        let pattern_path = Path::new(pattern.trim_end_matches('/'));
        if relative.starts_with(pattern_path)
            || relative
                .components()
                .any(|component| component.as_os_str() == pattern_path.as_os_str())
        {
            return true;
        }
    }

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
