//! Tracing subscriber setup.
//!
//! The decoder reports each rule it applies (skipped records, clipped temp
//! basals, suppressed duplicate carbs, window-edge suspensions) at debug
//! level. `glucodyn decode` prints the timeline itself on stdout, so the
//! subscriber always writes to stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the subscriber at INFO, or at whatever RUST_LOG asks for.
///
/// Set `RUST_LOG=glucodyn_core=debug` to trace individual decoding decisions.
pub fn init() {
    init_with_level("info")
}

/// Install the subscriber with `default_level` unless RUST_LOG is set
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Route decoder logs through the test harness's captured output
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
