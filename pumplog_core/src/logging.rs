//! Tracing setup for pumplog.
//!
//! Everything is written to stderr; stdout carries only decoded events or
//! JSON-line records. At debug, the decoder reports each page it reads and
//! the correlator reports events it could not pair. Info carries the
//! correlation and parse summaries and which config or settings file was
//! loaded. Warn carries records skipped under lenient parsing. Dependencies
//! stay at warn whatever level is asked for.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crate targets that follow the requested level
const TARGETS: [&str; 2] = ["pumplog_core", "pumplog"];

/// Warn-level logging, overridable with RUST_LOG
pub fn init() {
    init_with_level("warn")
}

/// Log pumplog's own targets at `default_level` unless RUST_LOG is set
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn directives(level: &str) -> String {
    TARGETS
        .iter()
        .fold(String::from("warn"), |acc, target| {
            format!("{acc},{target}={level}")
        })
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(directives("debug")))
        .try_init();
}
