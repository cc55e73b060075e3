use std::str::FromStr;

use tracing::Level;

/// Installs the JSON subscriber used by every function.
///
/// `LOG_LEVEL` overrides the default `INFO` level. Time is left out because
/// CloudWatch stamps every line on ingestion.
pub fn init() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| Level::from_str(&level).ok())
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .json()
        .with_max_level(level)
        .with_current_span(false)
        .with_span_list(false)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_line_number(true)
        .init();
}
