//! Terminal output helpers.
//!
//! Status lines go to stderr so stdout stays free for piping.
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! ui::init_colors();
//! ui::info("Watching target 'app'");
//! ui::success("Target 'app' built in 120ms");
//! ```

mod format;
mod messages;

use std::sync::atomic::{AtomicBool, Ordering};

pub use format::{format_duration, format_url};
pub use messages::{error, info, success, warning};

static COLORS: AtomicBool = AtomicBool::new(true);

/// Whether colored output should be used.
///
/// `NO_COLOR` wins over `FORCE_COLOR`; otherwise colors follow whether stderr
/// is a terminal.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::user_attended_stderr()
}

/// Decide once whether status lines are colored.
pub fn init_colors() {
    set_colors(should_use_color());
}

/// Force colors on or off, e.g. for `--no-color`.
pub fn set_colors(enabled: bool) {
    COLORS.store(enabled, Ordering::Relaxed);
    console::set_colors_enabled_stderr(enabled);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
