// src/logging.rs
// =============================================================================
// Sets up the tracing subscriber.
//
// Logs go to stderr so that `--json` output on stdout can be piped safely.
// RUST_LOG always wins; otherwise `-v` switches our crate to debug.
// =============================================================================

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "warn,site_mirror=debug"
    } else {
        "warn,site_mirror=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
