//! Tracing setup shared by the orchestrator binary and the CLI-less
//! components it embeds.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. `json` selects structured JSON
/// output (suitable for log aggregation); otherwise a compact human-readable
/// formatter is used. The env filter defaults to `info` and honors
/// `RUST_LOG`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
