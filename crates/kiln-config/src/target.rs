//! Build targets and the registry that resolves them by name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::defaults::default_entry;
use crate::error::{ConfigError, Result};

/// Source and output directories of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPaths {
    pub source: PathBuf,
    pub build: PathBuf,
}

/// A named build unit.
///
/// Targets are read-only once loaded; the dev core only ever reads the paths
/// and flags below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Filled from the key under `[targets]` when loaded from a file
    #[serde(default)]
    pub name: String,

    pub paths: TargetPaths,

    /// Run the built entry with the process runner after every successful build
    #[serde(default)]
    pub run_on_development: bool,

    /// Dependencies bundled into the output instead of being left external
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_modules: Vec<String>,

    /// Entry file inside `paths.build` executed by the runner
    #[serde(default = "default_entry")]
    pub entry: PathBuf,

    /// Build command (argv) run by the command bundler on every change
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

impl BuildTarget {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        build: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            paths: TargetPaths {
                source: source.into(),
                build: build.into(),
            },
            run_on_development: false,
            include_modules: Vec::new(),
            entry: default_entry(),
            command: Vec::new(),
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_run_on_development(mut self, run: bool) -> Self {
        self.run_on_development = run;
        self
    }

    /// Absolute (or root-relative) path of the file the runner executes.
    pub fn executable(&self) -> PathBuf {
        self.paths.build.join(&self.entry)
    }

    /// Make relative paths relative to `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        if self.paths.source.is_relative() {
            self.paths.source = root.join(&self.paths.source);
        }
        if self.paths.build.is_relative() {
            self.paths.build = root.join(&self.paths.build);
        }
    }
}

/// Ordered collection of targets keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: IndexMap<String, Arc<BuildTarget>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from parsed targets, naming each after its key.
    pub fn from_map(targets: IndexMap<String, BuildTarget>) -> Self {
        let targets = targets
            .into_iter()
            .map(|(name, mut target)| {
                target.name = name.clone();
                (name, Arc::new(target))
            })
            .collect();
        Self { targets }
    }

    pub fn insert(&mut self, target: BuildTarget) {
        self.targets.insert(target.name.clone(), Arc::new(target));
    }

    /// Look a target up by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TargetNotFound`] listing the known names.
    pub fn get_target(&self, name: &str) -> Result<Arc<BuildTarget>> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::TargetNotFound {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BuildTarget>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_names_targets_after_keys() {
        let mut map = IndexMap::new();
        map.insert("app".to_string(), BuildTarget::new("", "src/app", "dist/app"));

        let registry = TargetRegistry::from_map(map);
        let target = registry.get_target("app").unwrap();
        assert_eq!(target.name, "app");
        assert_eq!(target.paths.build, PathBuf::from("dist/app"));
    }

    #[test]
    fn get_target_reports_unknown_name() {
        let mut registry = TargetRegistry::new();
        registry.insert(BuildTarget::new("app", "src", "dist"));
        registry.insert(BuildTarget::new("api", "api", "dist/api"));

        match registry.get_target("admin") {
            Err(ConfigError::TargetNotFound { name, available }) => {
                assert_eq!(name, "admin");
                assert_eq!(available, "app, api");
            }
            other => panic!("expected TargetNotFound, got {other:?}"),
        }
    }

    #[test]
    fn executable_joins_build_dir_and_entry() {
        let target = BuildTarget::new("api", "src/api", "dist/api");
        assert_eq!(target.executable(), PathBuf::from("dist/api/index.js"));
    }

    #[test]
    fn resolve_paths_keeps_absolute_paths() {
        let mut target = BuildTarget::new("app", "/abs/src", "dist");
        target.resolve_paths(Path::new("/project"));
        assert_eq!(target.paths.source, PathBuf::from("/abs/src"));
        assert_eq!(target.paths.build, PathBuf::from("/project/dist"));
    }
}
