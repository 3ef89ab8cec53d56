use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "info"
    } else {
        "warn"
    }
}

/// Installs the global subscriber. Diagnostics go to stderr so they never mix
/// with the result rows, and `RUST_LOG` overrides the verbosity-derived level.
/// Calling it twice is harmless.
pub fn init(verbose: bool, no_color: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    let fmt_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
