//! Watch-mode settings shared by every target.

use serde::{Deserialize, Serialize};

use crate::defaults::{default_debounce_ms, default_watch_ignore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Directory names or `*.ext` patterns that never trigger a rebuild
    #[serde(default = "default_watch_ignore")]
    pub ignore: Vec<String>,

    /// Reject pending requests when a build fails instead of waiting for the next good one
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore: default_watch_ignore(),
            fail_fast: false,
        }
    }
}
