//! Process signal listeners with explicit registration.
//!
//! Components that own a resource (a listening server, a child process) add a
//! listener per signal while the resource is alive and remove it on teardown.
//! The registry counts every registration so tests can check that teardown
//! really removed what start added.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Termination signals the dev tools react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl Signal {
    pub const ALL: [Signal; 2] = [Signal::Interrupt, Signal::Terminate];

    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback run when a signal arrives.
pub type SignalHandler = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listener {
    signal: Signal,
    handler: SignalHandler,
}

struct Inner {
    listeners: Mutex<HashMap<ListenerId, Listener>>,
    next_id: AtomicU64,
    forward_os_signals: bool,
    forwarding: Mutex<Vec<Signal>>,
}

/// Shared table of signal listeners. Clones share the same table.
#[derive(Clone)]
pub struct SignalRegistry {
    inner: Arc<Inner>,
}

impl fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("registered", &self.registered_count())
            .field("total_registrations", &self.total_registrations())
            .finish()
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRegistry {
    /// Registry that receives real process signals.
    ///
    /// OS delivery starts lazily on the first registration for each signal and
    /// needs a running tokio runtime at that point.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Registry that only fires through [`SignalRegistry::trigger`].
    pub fn manual() -> Self {
        Self::build(false)
    }

    fn build(forward_os_signals: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                forward_os_signals,
                forwarding: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn register(&self, signal: Signal, handler: SignalHandler) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner
            .listeners
            .lock()
            .insert(id, Listener { signal, handler });
        tracing::trace!(?id, %signal, "signal listener registered");

        if self.inner.forward_os_signals {
            self.forward(signal);
        }
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn deregister(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.lock().remove(&id).is_some();
        if removed {
            tracing::trace!(?id, "signal listener removed");
        }
        removed
    }

    /// Listeners currently registered.
    pub fn registered_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Listeners currently registered for `signal`.
    pub fn count_for(&self, signal: Signal) -> usize {
        self.inner
            .listeners
            .lock()
            .values()
            .filter(|listener| listener.signal == signal)
            .count()
    }

    /// Registrations ever made, including removed ones.
    pub fn total_registrations(&self) -> u64 {
        self.inner.next_id.load(Ordering::SeqCst)
    }

    /// Run every listener for `signal`, in registration order.
    pub async fn trigger(&self, signal: Signal) {
        let mut handlers: Vec<(ListenerId, SignalHandler)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(_, listener)| listener.signal == signal)
            .map(|(id, listener)| (*id, listener.handler.clone()))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        tracing::debug!(%signal, listeners = handlers.len(), "delivering signal");
        for (_, handler) in handlers {
            handler().await;
        }
    }

    fn forward(&self, signal: Signal) {
        let mut forwarding = self.inner.forwarding.lock();
        if forwarding.contains(&signal) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(%signal, "no runtime; OS delivery not installed");
            return;
        };
        forwarding.push(signal);

        let registry = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            while wait_for(signal).await {
                let Some(inner) = registry.upgrade() else {
                    return;
                };
                SignalRegistry { inner }.trigger(signal).await;
            }
        });
    }
}

/// Wait for one OS delivery of `signal`. Returns `false` if it cannot be observed.
async fn wait_for(signal: Signal) -> bool {
    match signal {
        Signal::Interrupt => tokio::signal::ctrl_c().await.is_ok(),
        #[cfg(unix)]
        Signal::Terminate => {
            use tokio::signal::unix::{signal as unix_signal, SignalKind};
            match unix_signal(SignalKind::terminate()) {
                Ok(mut stream) => stream.recv().await.is_some(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    false
                }
            }
        }
        #[cfg(not(unix))]
        Signal::Terminate => false,
    }
}

/// Wrap an async closure as a [`SignalHandler`].
pub fn handler<F, Fut>(f: F) -> SignalHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture)
}
