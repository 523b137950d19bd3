use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over `default_level`; output
/// goes to stderr so machine-readable stdout stays clean.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
