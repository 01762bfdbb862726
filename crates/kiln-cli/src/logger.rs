//! Logging setup for the kiln CLI.
//!
//! Library crates only emit `tracing` events; this module installs the
//! subscriber that prints them.
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("watching target 'app'");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "kiln=debug,kiln_dev=debug,kiln_config=debug,kiln_cli=debug";
const DEFAULT_FILTER: &str = "kiln=info,kiln_dev=info,kiln_config=info,kiln_cli=info";
const QUIET_FILTER: &str = "error";

/// Filter for the given verbosity flags.
///
/// `--verbose` wins over `--quiet`; with neither, `RUST_LOG` is honoured before
/// falling back to info for the kiln crates.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Install the global subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && crate::ui::should_use_color())
        .compact();

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
