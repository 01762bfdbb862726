//! Command implementations for the kiln CLI.
//!
//! - [`dev`] - dev middleware in front of an axum app
//! - [`serve`] - standalone static dev server
//! - [`run`] - rebuild and restart a target's entry
//! - [`check`] - configuration validation
//!
//! Each command exposes an `execute` function taking its parsed arguments and
//! the global `--config` path.

pub mod check;
pub mod dev;
pub mod run;
pub mod serve;
mod watch;

use std::sync::Arc;

use kiln_dev::{signals, Signal, SignalRegistry};
use tokio::sync::Notify;

pub use check::execute as check_execute;
pub use dev::execute as dev_execute;
pub use run::execute as run_execute;
pub use serve::execute as serve_execute;

/// Notified once SIGINT or SIGTERM reaches `registry`.
pub(crate) fn shutdown_notify(registry: &SignalRegistry) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    for signal in Signal::ALL {
        let notify = notify.clone();
        registry.register(
            signal,
            signals::handler(move || {
                let notify = notify.clone();
                async move { notify.notify_one() }
            }),
        );
    }
    notify
}
