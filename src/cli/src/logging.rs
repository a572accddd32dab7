//! Tracing subscriber setup.

use kiln_core::{LogConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Build the filter for `config`, falling back to `warn` on a bad directive.
pub fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Logs always go to stderr.
pub fn init(config: &LogConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
