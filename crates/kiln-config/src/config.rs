//! Root configuration structure for kiln.
//!
//! For file discovery, see the `discovery` module.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Result as ConfigResult};
use crate::run::RunOptions;
use crate::serve::DevServerOptions;
use crate::target::{BuildTarget, TargetRegistry};
use crate::watch::WatchOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub targets: IndexMap<String, BuildTarget>,

    #[serde(default)]
    pub serve: DevServerOptions,

    #[serde(default)]
    pub run: RunOptions,

    #[serde(default)]
    pub watch: WatchOptions,
}

impl KilnConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::KilnConfig;
    /// use serde_json::json;
    ///
    /// let value = json!({
    ///     "targets": {
    ///         "app": { "paths": { "source": "src/app", "build": "dist/app" } }
    ///     }
    /// });
    ///
    /// let config = KilnConfig::from_value(value).unwrap();
    /// assert_eq!(config.targets["app"].name, "app");
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let mut config: KilnConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::invalid("config", e.to_string()))?;
        config.name_targets();
        Ok(config)
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// Target registry built from the `[targets]` table.
    pub fn registry(&self) -> TargetRegistry {
        TargetRegistry::from_map(self.targets.clone())
    }

    /// Anchor every relative path at `root` (normally the config file's directory).
    pub fn resolve_paths(&mut self, root: &Path) {
        for target in self.targets.values_mut() {
            target.resolve_paths(root);
        }

        for base in &mut self.serve.content_base {
            if base.is_relative() {
                *base = root.join(&*base);
            }
        }

        if let Some(tls) = &mut self.serve.https {
            if tls.cert.is_relative() {
                tls.cert = root.join(&tls.cert);
            }
            if tls.key.is_relative() {
                tls.key = root.join(&tls.key);
            }
        }

        if !self.run.file.as_os_str().is_empty() && self.run.file.is_relative() {
            self.run.file = root.join(&self.run.file);
        }
    }

    fn name_targets(&mut self) {
        for (name, target) in self.targets.iter_mut() {
            target.name = name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn from_value_creates_config() {
        let value = json!({
            "targets": {
                "api": {
                    "paths": { "source": "src/api", "build": "dist/api" },
                    "run_on_development": true,
                    "command": ["npx", "rollup", "-c"]
                }
            },
            "serve": { "content_base": ["public"], "history_api_fallback": true }
        });

        let config = KilnConfig::from_value(value).unwrap();
        let api = &config.targets["api"];
        assert_eq!(api.name, "api");
        assert!(api.run_on_development);
        assert_eq!(api.command, vec!["npx", "rollup", "-c"]);
        assert!(config.serve.history_api_fallback);
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn from_value_rejects_wrong_types() {
        let value = json!({ "serve": { "port": "not-a-port" } });
        let err = KilnConfig::from_value(value).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn to_value_serializes_config() {
        let mut config = KilnConfig::default();
        config.serve.port = 3000;

        let value = config.to_value().unwrap();
        assert_eq!(value["serve"]["port"], json!(3000));
    }

    #[test]
    fn resolve_paths_anchors_relative_paths() {
        let value = json!({
            "targets": { "app": { "paths": { "source": "src", "build": "dist" } } },
            "serve": { "content_base": ["public", "/srv/static"] }
        });
        let mut config = KilnConfig::from_value(value).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.targets["app"].paths.build, PathBuf::from("/project/dist"));
        assert_eq!(
            config.serve.content_base,
            vec![PathBuf::from("/project/public"), PathBuf::from("/srv/static")]
        );
    }
}
