use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber on stderr so stdout stays free for data output.
///
/// `RUST_LOG` replaces the default `energy_analytics=info,warn` filter when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("energy_analytics=info,warn"));

    // A second call (e.g. from a test harness) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
