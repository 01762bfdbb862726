//! Layered configuration for CLI commands.
//!
//! Priority: CLI flags > `KILN_*` environment variables > config file > defaults.
//!
//! Environment keys nest with a double underscore, so `KILN_SERVE__PORT=3000`
//! sets `serve.port` and `KILN_WATCH__FAIL_FAST=true` sets `watch.fail_fast`.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use kiln_config::{ConfigDiscovery, ConfigError, KilnConfig, CONFIG_FILE_NAME};
use serde::Serialize;

use crate::error::{CliError, Result};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "KILN_";

/// Configuration after all layers were merged and paths anchored.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KilnConfig,
    /// Directory relative config paths are anchored at
    pub root: PathBuf,
    /// File the configuration came from, if any
    pub source: Option<PathBuf>,
}

/// CLI flags layered over file and environment values, keyed by dotted path.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    entries: Vec<(String, serde_json::Value)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `key` (e.g. `"serve.port"`) with `value`.
    pub fn set(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.entries.push((key.to_string(), value)),
            Err(e) => tracing::warn!("ignoring override for {key}: {e}"),
        }
        self
    }

    /// Override `key` only when the flag was given.
    pub fn set_opt<T: Serialize>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Override a boolean flag only when it is switched on.
    pub fn set_flag(self, key: &str, enabled: bool) -> Self {
        if enabled { self.set(key, true) } else { self }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the configuration for a command.
///
/// With `config_path` the file must exist. Without it, `kiln.toml` or
/// `package.json#kiln` is discovered in the working directory; if neither
/// exists the defaults are used.
pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<LoadedConfig> {
    let cwd = std::env::current_dir()?;
    load_from(&cwd, config_path, overrides)
}

/// [`load`] with an explicit working directory.
pub fn load_from(
    cwd: &Path,
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<LoadedConfig> {
    let source = match config_path {
        Some(path) => {
            let path = absolutize(cwd, path);
            if !path.is_file() {
                return Err(CliError::FileNotFound(path));
            }
            Some(path)
        }
        None => ConfigDiscovery::new(cwd).find(),
    };

    let root = source
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf());

    let mut figment = Figment::new().merge(Serialized::defaults(KilnConfig::default()));
    let mut declared = Vec::new();

    if let Some(path) = &source {
        tracing::debug!("Loading config from {}", path.display());
        let raw = kiln_config::read_value(path)?;
        declared = declared_targets(&raw);
        figment = if path.file_name() == Some(std::ffi::OsStr::new(CONFIG_FILE_NAME)) {
            figment.merge(Toml::file(path))
        } else {
            figment.merge(Serialized::defaults(raw))
        };
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    for (key, value) in overrides.entries {
        figment = figment.merge(Serialized::default(&key, value));
    }

    let value: serde_json::Value = figment
        .extract()
        .map_err(|e| ConfigError::invalid("configuration", e.to_string()))?;
    let mut config = KilnConfig::from_value(value)?;
    restore_target_order(&mut config, &declared);
    config.resolve_paths(&root);

    Ok(LoadedConfig {
        config,
        root,
        source,
    })
}

/// Target names in the order the config file declares them.
fn declared_targets(raw: &serde_json::Value) -> Vec<String> {
    raw.get("targets")
        .and_then(serde_json::Value::as_object)
        .map(|targets| targets.keys().cloned().collect())
        .unwrap_or_default()
}

/// Figment sorts table keys; put file targets back in declaration order.
///
/// Targets only defined through the environment follow, sorted by name.
fn restore_target_order(config: &mut KilnConfig, declared: &[String]) {
    let rank = |name: &str| {
        declared
            .iter()
            .position(|declared| declared == name)
            .unwrap_or(usize::MAX)
    };
    config.targets.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));
}

/// Anchor a CLI path at the working directory.
pub fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
