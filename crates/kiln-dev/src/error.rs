//! Error types for the dev core.
//!
//! Construction-time failures are returned synchronously from constructors and
//! `generate`. Request-time failures travel through
//! [`MiddlewareOutcome::Failed`](crate::middleware::MiddlewareOutcome) and are
//! rendered by the [`IntoResponse`] impl below.

use std::path::PathBuf;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use kiln_config::ConfigError;
use thiserror::Error;

pub type Result<T, E = DevError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DevError {
    /// Target lookup or option validation failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File required by the runner or server does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The bundler could not produce a configuration or a watch session
    #[error("bundler error: {0}")]
    Bundler(String),

    /// A build failed while requests were waiting and the fail-fast policy is active
    #[error("build of target '{target}' failed: {message}")]
    BuildFailed { target: String, message: String },

    /// The readiness signal was dropped before it resolved
    #[error("watch session for target '{0}' closed before a build completed")]
    SessionClosed(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for DevError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_response_is_internal_error() {
        let err = DevError::Server("boom".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let err = DevError::Spawn {
            program: "node".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "failed to spawn 'node': no such file");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: DevError = ConfigError::NotFound.into();
        assert!(err.to_string().starts_with("config not found"));
    }
}
