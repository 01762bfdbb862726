//! Boundary to the bundler running in watch mode.
//!
//! The dev core only needs two things from a bundler: a configuration for a
//! target, and a watch session that streams [`WatchEvent`]s. [`CommandBundler`]
//! implements both by watching a target's source directory and re-running its
//! build command on every change.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use kiln_config::{BuildTarget, WatchOptions};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{DevError, Result};
use crate::watcher::FileWatcher;

/// Kind of build a configuration is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Development,
    Production,
}

/// Everything a bundler needs to watch one target.
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    pub target: Arc<BuildTarget>,
    pub build_type: BuildType,
    pub watch: WatchOptions,
}

/// Lifecycle event emitted by a watch session.
///
/// Deserializes from `{ "code": "START" | "END" | "ERROR" | "FATAL", ... }`;
/// any other code becomes [`WatchEvent::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "UPPERCASE")]
pub enum WatchEvent {
    Start,
    End {
        #[serde(default)]
        duration_ms: u64,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Fatal {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Stream of events from one running watcher.
///
/// Dropping the session stops the task that produces the events.
#[derive(Debug)]
pub struct WatchSession {
    events: mpsc::Receiver<WatchEvent>,
    task: Option<JoinHandle<()>>,
}

impl WatchSession {
    pub fn new(events: mpsc::Receiver<WatchEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Session fed by some other producer (used by in-process bundlers and tests).
    pub fn from_receiver(events: mpsc::Receiver<WatchEvent>) -> Self {
        Self { events, task: None }
    }

    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A bundler that can run in watch mode.
pub trait Bundler: Send + Sync {
    /// Produce the watch configuration for `target`.
    fn configuration(&self, target: &Arc<BuildTarget>, build_type: BuildType)
    -> Result<BundlerConfig>;

    /// Start watching. Must be called from within a tokio runtime.
    fn watch(&self, config: BundlerConfig) -> Result<WatchSession>;
}

/// Runs a target's `command` on start and after every debounced source change.
#[derive(Debug, Clone, Default)]
pub struct CommandBundler {
    options: WatchOptions,
}

impl CommandBundler {
    pub fn new(options: WatchOptions) -> Self {
        Self { options }
    }
}

impl Bundler for CommandBundler {
    fn configuration(
        &self,
        target: &Arc<BuildTarget>,
        build_type: BuildType,
    ) -> Result<BundlerConfig> {
        if target.command.is_empty() {
            return Err(DevError::Bundler(format!(
                "target '{}' has no build command",
                target.name
            )));
        }

        let mut watch = self.options.clone();
        // Output written inside the source tree must not retrigger the build
        if let Ok(nested) = target.paths.build.strip_prefix(&target.paths.source) {
            if !nested.as_os_str().is_empty() {
                watch.ignore.push(nested.to_string_lossy().into_owned());
            }
        }

        Ok(BundlerConfig {
            target: target.clone(),
            build_type,
            watch,
        })
    }

    fn watch(&self, config: BundlerConfig) -> Result<WatchSession> {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(drive(config, tx));
        Ok(WatchSession::new(rx, task))
    }
}

async fn drive(config: BundlerConfig, tx: mpsc::Sender<WatchEvent>) {
    let source: PathBuf = config.target.paths.source.clone();
    let (_watcher, mut changes) = match FileWatcher::new(
        source,
        config.watch.ignore.clone(),
        config.watch.debounce_ms,
    ) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = tx
                .send(WatchEvent::Fatal {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    if !build(&config, &tx).await {
        return;
    }

    while let Some(change) = changes.recv().await {
        tracing::debug!(path = %change.path().display(), "source changed");
        // Coalesce everything queued during the previous build into one rebuild
        while changes.try_recv().is_ok() {}

        if !build(&config, &tx).await {
            return;
        }
    }
}

/// Run the build command once. Returns `false` once nobody is listening.
async fn build(config: &BundlerConfig, tx: &mpsc::Sender<WatchEvent>) -> bool {
    if tx.send(WatchEvent::Start).await.is_err() {
        return false;
    }

    let started = Instant::now();
    let (program, args) = match config.target.command.split_first() {
        Some(split) => split,
        None => return true,
    };

    let event = match Command::new(program)
        .args(args)
        .env("KILN_TARGET", &config.target.name)
        .env("KILN_BUILD_DIR", &config.target.paths.build)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                tracing::debug!(target_name = %config.target.name, "{}", stdout.trim_end());
            }
            WatchEvent::End {
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("build command exited with {}", output.status)
            } else {
                stderr.trim_end().to_string()
            };
            WatchEvent::Error { message }
        }
        Err(e) => WatchEvent::Fatal {
            message: DevError::Spawn {
                program: program.clone(),
                source: e,
            }
            .to_string(),
        },
    };

    tx.send(event).await.is_ok()
}
