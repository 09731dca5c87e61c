//! Logging setup for bugfixer
//!
//! Events go to stderr so stdout stays free for the final banner.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`; an unparsable `level` falls back to `info`.
/// Calling this twice is harmless.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level, "logging initialized");
    }
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
