//! Wires `tracing-subscriber`'s `EnvFilter` + `fmt` layer, the way the
//! reference codebase's `enable_tracing()` helper does, callable from both
//! the `signaling-server` binary and tests.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber from `filter` (an
/// `EnvFilter` directive string, e.g. `"info"` or `"cagenet=debug"`). Safe
/// to call more than once per process; later calls are no-ops.
pub fn init(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Like [`init`], but directs output through the test harness's captured
/// writer so `cargo test -- --nocapture` behaves as expected.
#[cfg(any(test, feature = "testutil"))]
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new("debug").unwrap())
        .with_test_writer()
        .try_init();
}
