use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `RUST_LOG`-filtered subscriber that writes through the test
/// harness. Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init();
}
