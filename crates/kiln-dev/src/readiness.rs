//! Build readiness per target.
//!
//! Every target is either [`Readiness::Ready`] with a handle to its build output,
//! or [`Readiness::NotReady`] with exactly one live [`PendingSignal`]. Requests that
//! arrive while a target is not ready subscribe to that signal and are all
//! released by the same send once the build completes.
//!
//! ```text
//!            mark_building              mark_ready
//!   Ready ─────────────────▶ NotReady ─────────────▶ Ready
//!                             │    ▲
//!                             └────┘ mark_building / mark_failed
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_config::BuildTarget;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{DevError, Result};
use crate::fs::FileSystemHandle;

/// What a pending waiter eventually receives.
type SignalValue = Option<std::result::Result<FileSystemHandle, BuildFailure>>;

/// How failed builds affect requests that are waiting for a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep waiters blocked until a later build succeeds.
    #[default]
    WaitForSuccess,
    /// Reject current waiters with [`DevError::BuildFailed`].
    FailFast,
}

/// A failed build as reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub target: String,
    pub message: String,
}

impl BuildFailure {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl From<BuildFailure> for DevError {
    fn from(failure: BuildFailure) -> Self {
        DevError::BuildFailed {
            target: failure.target,
            message: failure.message,
        }
    }
}

/// One-shot broadcast resolved when a target becomes ready.
#[derive(Debug)]
pub struct PendingSignal {
    generation: u64,
    sender: watch::Sender<SignalValue>,
}

impl PendingSignal {
    fn new(generation: u64) -> Self {
        let (sender, _) = watch::channel(None);
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn subscribe(&self) -> watch::Receiver<SignalValue> {
        self.sender.subscribe()
    }

    fn resolve(self, handle: FileSystemHandle) {
        // Waiters that already gave up leave no receivers behind
        let _ = self.sender.send(Some(Ok(handle)));
    }

    fn reject(self, failure: BuildFailure) {
        let _ = self.sender.send(Some(Err(failure)));
    }
}

#[derive(Debug)]
pub enum Readiness {
    NotReady(PendingSignal),
    Ready(FileSystemHandle),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

/// Readiness state for every target seen so far, keyed by target name.
#[derive(Debug, Default)]
pub struct ReadinessRegistry {
    entries: Mutex<HashMap<String, Readiness>>,
    policy: FailurePolicy,
    generations: AtomicU64,
}

impl ReadinessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Record that a build of `target` has started.
    ///
    /// A ready (or unseen) target gets a fresh pending signal. A target that is
    /// already building keeps its current signal so earlier waiters are not lost.
    pub fn mark_building(&self, target: &BuildTarget) {
        let mut entries = self.entries.lock();
        match entries.get(&target.name) {
            Some(Readiness::NotReady(_)) => {}
            Some(Readiness::Ready(_)) | None => {
                let signal = self.fresh_signal();
                tracing::debug!(
                    target_name = %target.name,
                    generation = signal.generation,
                    "target is building"
                );
                entries.insert(target.name.clone(), Readiness::NotReady(signal));
            }
        }
    }

    /// Record a successful build and release everyone waiting on it.
    pub fn mark_ready(&self, target: &BuildTarget) {
        let handle = FileSystemHandle::new(target.paths.build.clone());
        let previous = self
            .entries
            .lock()
            .insert(target.name.clone(), Readiness::Ready(handle.clone()));

        if let Some(Readiness::NotReady(signal)) = previous {
            tracing::debug!(
                target_name = %target.name,
                generation = signal.generation,
                "releasing waiting requests"
            );
            signal.resolve(handle);
        }
    }

    /// Record a failed build.
    ///
    /// Readiness is left untouched. Under [`FailurePolicy::FailFast`] the current
    /// waiters are rejected and later callers wait on a fresh signal.
    pub fn mark_failed(&self, target: &BuildTarget, failure: BuildFailure) {
        tracing::warn!(target_name = %target.name, error = %failure.message, "build failed");

        if self.policy != FailurePolicy::FailFast {
            return;
        }

        let rejected = match self.entries.lock().get_mut(&target.name) {
            Some(Readiness::NotReady(signal)) => {
                Some(std::mem::replace(signal, self.fresh_signal()))
            }
            _ => None,
        };

        if let Some(signal) = rejected {
            signal.reject(failure);
        }
    }

    /// Build output of `target`, waiting for the next successful build if needed.
    ///
    /// An unseen target is registered as not ready so the first build resolves it.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::BuildFailed`] when a waiter is rejected under the
    /// fail-fast policy, and [`DevError::SessionClosed`] if the signal is dropped
    /// without resolving.
    pub async fn file_system(&self, target: &BuildTarget) -> Result<FileSystemHandle> {
        let mut receiver = {
            let mut entries = self.entries.lock();
            match entries.get(&target.name) {
                Some(Readiness::Ready(handle)) => return Ok(handle.clone()),
                Some(Readiness::NotReady(signal)) => signal.subscribe(),
                None => {
                    let signal = self.fresh_signal();
                    let receiver = signal.subscribe();
                    entries.insert(target.name.clone(), Readiness::NotReady(signal));
                    receiver
                }
            }
        };

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| DevError::SessionClosed(target.name.clone()))?
            .clone();

        match outcome {
            Some(Ok(handle)) => Ok(handle),
            Some(Err(failure)) => Err(failure.into()),
            None => Err(DevError::SessionClosed(target.name.clone())),
        }
    }

    pub fn is_ready(&self, target: &str) -> bool {
        self.entries
            .lock()
            .get(target)
            .is_some_and(Readiness::is_ready)
    }

    /// Generation of the live pending signal, or `None` when ready or unseen.
    pub fn pending_generation(&self, target: &str) -> Option<u64> {
        match self.entries.lock().get(target) {
            Some(Readiness::NotReady(signal)) => Some(signal.generation()),
            _ => None,
        }
    }

    fn fresh_signal(&self) -> PendingSignal {
        PendingSignal::new(self.generations.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
