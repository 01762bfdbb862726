//! Error handling for the kiln CLI.
//!
//! Library errors from `kiln-config` and `kiln-dev` convert into [`CliError`]
//! automatically. [`ResultExt`] attaches paths, hints and context, and
//! [`cli_error_to_miette`] turns the final error into a report in `main`.

use std::path::PathBuf;

use kiln_config::ConfigError;
use kiln_dev::DevError;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file missing, malformed or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failure in the dev middleware, server or runner
    #[error(transparent)]
    Dev(#[from] DevError),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors raised by the CLI itself
    #[error("Server error: {0}")]
    Server(String),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use kiln_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let path = Path::new("kiln.toml");
    /// std::fs::read_to_string(path).with_path(path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint line to the error.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error with a message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{err}\n\nHint: {hint}"))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{msg}: {err}"))
        })
    }
}

/// Convert a [`CliError`] into a miette report.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Dev(DevError::Config(e)) | CliError::Config(e) => {
            miette::miette!("Configuration error: {}", e)
        }
        CliError::Dev(DevError::Spawn { program, source }) => miette::miette!(
            "Failed to start '{}': {}\n\nHint: Check that '{}' is installed and on your PATH",
            program,
            source,
            program
        ),
        CliError::Dev(DevError::Tls(msg)) => miette::miette!(
            "TLS error: {}\n\nHint: Both --cert and --key must point at PEM files",
            msg
        ),
        other => miette::miette!("{}", other),
    }
}
