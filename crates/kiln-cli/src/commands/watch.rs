//! Glue between watch sessions, the terminal and the process runner.

use std::time::Duration;

use kiln_config::{BuildTarget, RunOptions};
use kiln_dev::{FailurePolicy, ProcessRunner, SignalRegistry, WatchEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::ui;

pub(crate) fn failure_policy(fail_fast: bool) -> FailurePolicy {
    if fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::WaitForSuccess
    }
}

/// Runner executing `target`'s built entry with the `[run]` settings.
pub(crate) fn runner_for(
    target: &BuildTarget,
    run: &RunOptions,
    signals: SignalRegistry,
) -> Result<ProcessRunner> {
    let mut options = run.clone();
    options.file = target.executable();

    let runner = ProcessRunner::builder(options)
        .signals(signals)
        .on_start(|runner| {
            let pid = runner.pid().map(|pid| pid.to_string()).unwrap_or_default();
            ui::info(&format!("Started {} (pid {pid})", runner.file().display()));
        })
        .on_stop(|runner| ui::info(&format!("Stopped {}", runner.file().display())))
        .build()?;
    Ok(runner)
}

/// Print a status line for every applied build event of `target`.
pub(crate) fn report_builds(
    target: &str,
    mut events: broadcast::Receiver<WatchEvent>,
) -> JoinHandle<()> {
    let target = target.to_string();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => report(&target, &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "build reporter fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn report(target: &str, event: &WatchEvent) {
    match event {
        WatchEvent::Start => ui::info(&format!("Building '{target}'...")),
        WatchEvent::End { duration_ms } => ui::success(&format!(
            "Built '{target}' in {}",
            ui::format_duration(Duration::from_millis(*duration_ms))
        )),
        WatchEvent::Error { message } => {
            ui::error(&format!("Build of '{target}' failed: {message}"));
        }
        WatchEvent::Fatal { message } => {
            ui::error(&format!("Watch of '{target}' failed: {message}"));
        }
        WatchEvent::Unknown => ui::warning(&format!("Unrecognized event from '{target}'")),
    }
}

/// Restart `runner` after every successful build.
pub(crate) fn restart_after_builds(
    mut events: broadcast::Receiver<WatchEvent>,
    runner: ProcessRunner,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WatchEvent::End { .. }) => {
                    if let Err(e) = runner.run() {
                        ui::error(&format!("Failed to run {}: {e}", runner.file().display()));
                    }
                }
                Ok(_) => {}
                // A missed END still leaves the next one to restart on
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "runner missed build events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        runner.stop();
    })
}
