//! `tracing` subscriber setup shared by all vecport binaries.
//!
//! Progress and diagnostics go through `tracing` to stderr; the human-facing
//! reports each tool prints stay on stdout.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops. `RUST_LOG`, when set,
/// takes precedence over `level`.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails if already set
    let _ = subscriber.try_init();
}
