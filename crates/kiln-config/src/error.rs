//! Error types for configuration validation and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found\n\nHint: Create a kiln.toml file or add a 'kiln' field to package.json")]
    NotFound,

    #[error("target '{name}' is not defined\n\nHint: Available targets: {available}")]
    TargetNotFound { name: String, available: String },

    #[error("missing required field: {field}\n\nHint: {hint}")]
    MissingField { field: String, hint: String },

    #[error("invalid value for '{field}'{}", .hint.as_ref().map(|h| format!("\n\nHint: {h}")).unwrap_or_default())]
    InvalidValue { field: String, hint: Option<String> },

    #[error("path not found for '{field}': {}", .path.display())]
    PathNotFound { field: String, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Shorthand for an [`ConfigError::InvalidValue`] with a hint.
    pub fn invalid(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            hint: Some(hint.into()),
        }
    }
}
