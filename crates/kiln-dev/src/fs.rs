//! Read-only view of a build output directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Handle rooted at a target's build directory.
///
/// Cloning is cheap; every clone points at the same root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemHandle {
    root: Arc<Path>,
}

impl FileSystemHandle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::from(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a request-style relative path onto the root.
    ///
    /// Leading slashes are ignored. Returns `None` if the path tries to leave the
    /// root through `..` or a drive prefix.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        let mut resolved = self.root.to_path_buf();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        Some(resolved)
    }

    /// Path of `relative` if it names a regular file under the root.
    ///
    /// Missing files, directories and paths leaving the root yield `None`.
    pub async fn file(&self, relative: &str) -> std::io::Result<Option<PathBuf>> {
        let Some(path) = self.resolve(relative) else {
            tracing::debug!("rejected path outside {}: {relative}", self.root.display());
            return Ok(None);
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
