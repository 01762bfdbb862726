//! One watch session per build target.
//!
//! The controller starts the bundler lazily, the first time a request needs the
//! target, and turns the session's events into readiness transitions:
//!
//! | event            | registry                 | log                       |
//! |------------------|--------------------------|---------------------------|
//! | `START`          | `mark_building`          | building notice           |
//! | `END`            | `mark_ready`             | success notice            |
//! | `ERROR`          | `mark_failed`            | build error               |
//! | `FATAL`, unknown | `mark_failed`            | fatal build error         |
//!
//! Notices are emitted from a spawned task after the transition, never inline.

use std::sync::Arc;

use kiln_config::BuildTarget;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bundler::{BuildType, Bundler, WatchEvent, WatchSession};
use crate::error::Result;
use crate::readiness::{BuildFailure, ReadinessRegistry};

/// Capacity of the applied-event broadcast. Slow subscribers skip old events.
const EVENT_CAPACITY: usize = 64;

pub struct WatchController {
    target: Arc<BuildTarget>,
    bundler: Arc<dyn Bundler>,
    registry: Arc<ReadinessRegistry>,
    session: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<WatchEvent>,
}

impl WatchController {
    pub fn new(
        target: Arc<BuildTarget>,
        bundler: Arc<dyn Bundler>,
        registry: Arc<ReadinessRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            target,
            bundler,
            registry,
            session: Mutex::new(None),
            events,
        }
    }

    pub fn target(&self) -> &Arc<BuildTarget> {
        &self.target
    }

    /// Start the watch session unless one is already running.
    ///
    /// The check and the creation happen under one lock, so concurrent callers
    /// never start a second session.
    ///
    /// # Errors
    ///
    /// Returns the bundler's error if it cannot configure or start watching. A
    /// later call retries.
    pub fn ensure_started(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }

        let config = self
            .bundler
            .configuration(&self.target, BuildType::Development)?;
        let watch = self.bundler.watch(config)?;

        tracing::info!(target_name = %self.target.name, "starting watch session");
        *session = Some(tokio::spawn(run_session(
            watch,
            self.target.clone(),
            self.registry.clone(),
            self.events.clone(),
        )));

        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Events as they are applied to the registry.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

impl Drop for WatchController {
    fn drop(&mut self) {
        if let Some(task) = self.session.get_mut().take() {
            task.abort();
        }
    }
}

async fn run_session(
    mut session: WatchSession,
    target: Arc<BuildTarget>,
    registry: Arc<ReadinessRegistry>,
    events: broadcast::Sender<WatchEvent>,
) {
    while let Some(event) = session.recv().await {
        apply(&event, &target, &registry);
        // No subscribers is fine
        let _ = events.send(event);
    }

    tracing::warn!(target_name = %target.name, "watch session ended");
}

fn apply(event: &WatchEvent, target: &Arc<BuildTarget>, registry: &ReadinessRegistry) {
    match event {
        WatchEvent::Start => {
            registry.mark_building(target);
            notice(target, Notice::Building);
        }
        WatchEvent::End { duration_ms } => {
            registry.mark_ready(target);
            notice(target, Notice::Built(*duration_ms));
        }
        WatchEvent::Error { message } => {
            registry.mark_failed(target, BuildFailure::new(&target.name, message));
            tracing::error!(target_name = %target.name, "build error: {message}");
        }
        WatchEvent::Fatal { message } => {
            registry.mark_failed(target, BuildFailure::new(&target.name, message));
            tracing::error!(target_name = %target.name, "fatal build error: {message}");
        }
        WatchEvent::Unknown => {
            registry.mark_failed(
                target,
                BuildFailure::new(&target.name, "unrecognized watch event"),
            );
            tracing::error!(target_name = %target.name, "fatal build error: unrecognized watch event");
        }
    }
}

enum Notice {
    Building,
    Built(u64),
}

fn notice(target: &Arc<BuildTarget>, notice: Notice) {
    let target = target.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        match notice {
            Notice::Building => tracing::info!("building target '{}'...", target.name),
            Notice::Built(ms) => tracing::info!("target '{}' built in {ms}ms", target.name),
        }
    });
}
