//! Development-time serving for kiln.
//!
//! This crate connects a bundler running in watch mode to HTTP serving:
//!
//! - [`DevMiddleware`] holds requests until the watched target has built, then
//!   serves its output. Install it on any axum [`Router`](axum::Router).
//! - [`DevServer`] is a standalone static server with SPA fallback, optional
//!   TLS and signal-driven shutdown.
//! - [`ProcessRunner`] restarts a script under an interpreter, optionally with
//!   the inspector enabled.
//!
//! Readiness is tracked per target in a shared [`ReadinessRegistry`], and every
//! watch session is owned by one [`WatchController`] per build target.

pub mod bundler;
pub mod controller;
pub mod error;
pub mod fs;
pub mod middleware;
pub mod mime;
pub mod readiness;
pub mod runner;
pub mod server;
pub mod signals;
pub mod watcher;

pub use bundler::{BuildType, Bundler, BundlerConfig, CommandBundler, WatchEvent, WatchSession};
pub use controller::WatchController;
pub use error::{DevError, Result};
pub use fs::FileSystemHandle;
pub use middleware::{dev_middleware, DevMiddleware, DevMiddlewareFactory, MiddlewareOutcome};
pub use readiness::{BuildFailure, FailurePolicy, Readiness, ReadinessRegistry};
pub use runner::{CommandLine, ProcessRunner, ProcessRunnerBuilder};
pub use server::{DevServer, DevServerBuilder};
pub use signals::{Signal, SignalRegistry};
pub use watcher::{FileChange, FileWatcher};
