//! Tracing setup for the host binary. Logs go to stderr; stdout carries the
//! JSON line protocol.

use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` picks the filter (default `info`); `PEPEVAULT_LOG_JSON=1`
/// switches to JSON output.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("PEPEVAULT_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_writer(std::io::stderr)
            .try_init();
    }
}
