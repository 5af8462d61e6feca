//! Logging setup for the git-bin CLI.
//!
//! Diagnostics go to stderr so command output on stdout stays parseable.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level selected by the command-line flags.
pub fn level(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the flags.
pub fn init(verbose: bool, debug: bool) {
    let level = level(verbose, debug);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("git_bin={level},gitbin_core={level}")));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}
