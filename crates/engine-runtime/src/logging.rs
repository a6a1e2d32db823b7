use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber honouring `RUST_LOG`, falling back to
/// `default_directive`. Does nothing if a subscriber is already set.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

