//! Check command: validate the configuration without starting anything.

use std::path::Path;

use kiln_config::{validate, validate_fs, validate_serve, ConfigError};

use crate::cli::CheckArgs;
use crate::config::{self, ConfigOverrides};
use crate::error::Result;
use crate::ui;

/// Execute the check command.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] without a config file, and the first
/// validation error otherwise.
pub async fn execute(args: CheckArgs, config_path: Option<&Path>) -> Result<()> {
    let loaded = config::load(config_path, ConfigOverrides::new())?;
    let Some(source) = loaded.source else {
        return Err(ConfigError::NotFound.into());
    };
    let config = loaded.config;

    if args.no_fs {
        validate(&config)?;
    } else {
        validate_fs(&config)?;
    }
    if !config.serve.content_base.is_empty() {
        validate_serve(&config.serve)?;
    }

    ui::info(&format!("Checked {}", source.display()));
    for target in config.targets.values() {
        ui::info(&format!(
            "{}: {} -> {}",
            target.name,
            target.paths.source.display(),
            target.paths.build.display()
        ));
    }
    ui::success(&format!(
        "Configuration is valid ({} target{})",
        config.targets.len(),
        if config.targets.len() == 1 { "" } else { "s" }
    ));
    Ok(())
}
