//! Formatting for durations and addresses.

use std::time::Duration;

use owo_colors::OwoColorize;

/// Format a duration for build notices.
///
/// ```
/// use std::time::Duration;
/// use kiln_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// A URL highlighted for the "listening on" line.
pub fn format_url(url: &str) -> String {
    if super::colors_enabled() {
        url.cyan().underline().to_string()
    } else {
        url.to_string()
    }
}
