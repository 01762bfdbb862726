//! File-based config discovery for CLI use
//!
//! Handles finding and loading kiln configuration files from the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// Name of the dedicated config file.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Field read from `package.json` when no `kiln.toml` exists.
pub const PACKAGE_JSON_FIELD: &str = "kiln";

/// File-based configuration discovery
///
/// Searches for kiln configuration files in conventional locations and loads them.
/// Library users should use `KilnConfig::from_value()` directly.
///
/// # Example
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. TOML config: kiln.toml
    /// 2. package.json (kiln field)
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(CONFIG_FILE_NAME);
        if toml_path.exists() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        if pkg_path.exists() {
            if let Ok(content) = fs::read_to_string(&pkg_path) {
                if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
                    if parsed
                        .get(PACKAGE_JSON_FIELD)
                        .is_some_and(|field| !field.is_null())
                    {
                        return Some(pkg_path);
                    }
                }
            }
        }

        None
    }

    /// Load config from discovered file, with paths anchored at the root.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<KilnConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        let mut config = load_file(&path)?;
        config.resolve_paths(&self.root);
        Ok(config)
    }
}

/// Parse a `kiln.toml` or `package.json` file into its raw JSON value.
///
/// Paths inside the value are left untouched.
pub fn read_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;

    if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
        let parsed: Value = serde_json::from_str(&content)
            .map_err(|e| ConfigError::invalid("package.json", format!("Invalid JSON: {e}")))?;

        return match parsed.get(PACKAGE_JSON_FIELD) {
            Some(Value::Null) | None => Err(ConfigError::invalid(
                PACKAGE_JSON_FIELD,
                "Add a 'kiln' object to your package.json",
            )),
            Some(value) => Ok(value.clone()),
        };
    }

    let toml_val: toml::Value = toml::from_str(&content)
        .map_err(|e| ConfigError::invalid("toml", format!("Invalid TOML syntax: {e}")))?;

    serde_json::to_value(toml_val)
        .map_err(|e| ConfigError::invalid("toml", format!("TOML to JSON conversion failed: {e}")))
}

/// Load a config file without touching relative paths.
pub fn load_file(path: &Path) -> Result<KilnConfig> {
    tracing::debug!("Loading config from {}", path.display());
    KilnConfig::from_value(read_value(path)?)
}

/// Discover and load config from current directory (convenience function)
///
/// # Example
///
/// ```no_run
/// use kiln_config::discover;
///
/// let config = discover().unwrap();
/// ```
pub fn discover() -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}
