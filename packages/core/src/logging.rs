//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call one of these once at startup; `RUST_LOG` takes precedence
//! over the default filter.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global fmt subscriber. Panics if one is already installed.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Like [`init_tracing`], but returns false instead of panicking when a
/// subscriber is already set. Safe to call from every test.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init()
        .is_ok()
}
