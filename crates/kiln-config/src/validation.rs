//! Config validation
//!
//! Separates schema validation (no filesystem access) from filesystem validation
//! (for CLI use). Every check runs at construction time so misconfiguration never
//! surfaces at request time.

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};
use crate::run::RunOptions;
use crate::serve::DevServerOptions;
use crate::target::BuildTarget;

/// Validate a single target's schema.
pub fn validate_target(target: &BuildTarget) -> Result<()> {
    if target.name.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "targets.<name>".to_string(),
            hint: "Every target needs a non-empty name".to_string(),
        });
    }

    if target.paths.source.as_os_str().is_empty() {
        return Err(ConfigError::MissingField {
            field: format!("targets.{}.paths.source", target.name),
            hint: "Point 'source' at the directory the bundler watches".to_string(),
        });
    }

    if target.paths.build.as_os_str().is_empty() {
        return Err(ConfigError::MissingField {
            field: format!("targets.{}.paths.build", target.name),
            hint: "Point 'build' at the bundler's output directory".to_string(),
        });
    }

    if target.command.iter().any(|arg| arg.is_empty()) {
        return Err(ConfigError::invalid(
            format!("targets.{}.command", target.name),
            "Remove empty strings from the command",
        ));
    }

    Ok(())
}

/// Validate standalone server options.
pub fn validate_serve(options: &DevServerOptions) -> Result<()> {
    if options.content_base.is_empty() {
        return Err(ConfigError::MissingField {
            field: "serve.content_base".to_string(),
            hint: "List at least one directory to serve files from".to_string(),
        });
    }

    if options.host.trim().is_empty() {
        return Err(ConfigError::invalid("serve.host", "Host cannot be empty"));
    }

    if options.history_api_fallback && options.fallback.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "serve.fallback",
            "history_api_fallback needs a fallback entry file",
        ));
    }

    Ok(())
}

/// Validate process runner options.
pub fn validate_run(options: &RunOptions) -> Result<()> {
    if options.file.as_os_str().is_empty() {
        return Err(ConfigError::MissingField {
            field: "run.file".to_string(),
            hint: "Set the file the runner should execute".to_string(),
        });
    }

    if options.interpreter.trim().is_empty() {
        return Err(ConfigError::invalid("run.interpreter", "Interpreter cannot be empty"));
    }

    if options.inspect.enabled && options.inspect.port == 0 {
        return Err(ConfigError::invalid(
            "run.inspect.port",
            "The debugger needs a fixed port",
        ));
    }

    Ok(())
}

/// Schema-only validation of the whole config (no filesystem checks).
///
/// # Example
///
/// ```
/// use kiln_config::{validate, KilnConfig};
///
/// validate(&KilnConfig::default()).unwrap();
/// ```
pub fn validate(config: &KilnConfig) -> Result<()> {
    for target in config.targets.values() {
        validate_target(target)?;
    }
    Ok(())
}

/// Schema validation plus a check that every target's source directory exists.
pub fn validate_fs(config: &KilnConfig) -> Result<()> {
    validate(config)?;

    for target in config.targets.values() {
        if !target.paths.source.exists() {
            return Err(ConfigError::PathNotFound {
                field: format!("targets.{}.paths.source", target.name),
                path: target.paths.source.clone(),
            });
        }
    }

    for base in &config.serve.content_base {
        if !base.exists() {
            tracing::warn!("Content base does not exist yet: {}", base.display());
        }
    }

    Ok(())
}
