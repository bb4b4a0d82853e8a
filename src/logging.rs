//! Tracing initialization for tests and binaries
//!
//! Both entry points honour `RUST_LOG`, e.g.
//! `RUST_LOG=spectrum_engine=debug` or
//! `RUST_LOG=spectrum_engine::services::detector=trace`.

use once_cell::sync::Lazy;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for tests; safe to call from every test
pub fn init_test_tracing() {
    static TRACING: Lazy<()> = Lazy::new(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("spectrum_engine=warn"));

        // Another harness may already have installed a subscriber
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .with_test_writer()
            .try_init();
    });

    Lazy::force(&TRACING);
}

/// Initialize tracing for the binary. Call early in `main`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spectrum_engine=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}
