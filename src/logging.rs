use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "LYCHEN_LOG";

/// Install the stderr tracing layer.
///
/// stdout belongs to scripts and to the diagnostics the host prints for them,
/// so log events always go to stderr. Filter: `LYCHEN_LOG` > default "warn".
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // A subscriber may already be set when running under a test harness
    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init();
}
