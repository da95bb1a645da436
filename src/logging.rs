// Logging setup.
// Installs a tracing subscriber filtered by OCTODASH_LOG, RUST_LOG, or the default level.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "OCTODASH_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(filter_from(|key| std::env::var(key).ok()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn filter_from(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .filter_map(|key| lookup(key))
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}
