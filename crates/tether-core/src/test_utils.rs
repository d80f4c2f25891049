//! Shared helpers for tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing once for the test binary, honoring `RUST_LOG`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
