use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the stderr subscriber. `TA_MIGRATE_LOG` takes an `EnvFilter`
/// directive; `--debug` raises the default from `info` to `debug`.
pub fn init(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let directive = match env::var("TA_MIGRATE_LOG") {
        Ok(value) if !debug && !value.trim().is_empty() => value,
        _ => fallback.to_string(),
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_ansi(false),
        )
        .with(filter)
        .try_init();
}
