//! Logging initialization
//!
//! Simple `tracing` setup that respects the RUST_LOG environment variable
//! and falls back to an optional config-supplied filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the embedding process
///
/// Precedence: RUST_LOG, then the `filter` argument, then `"info"`.
///
/// # Arguments
/// * `filter` - Optional filter from config (e.g. "info", "orchestron=debug")
pub fn init_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        env_filter = match filter {
            Some(f) => EnvFilter::new(f),
            None => EnvFilter::new("info"),
        };
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}
