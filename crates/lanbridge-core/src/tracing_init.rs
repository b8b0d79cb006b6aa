//! Shared tracing/logging initialization.
//!
//! The setup binary logs every step through `tracing`; `--verbose` lowers
//! the default filter to `debug` so command lines and internal trace
//! messages show up, and `--log-json` switches to structured output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for the given verbosity.
pub const fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "lanbridge_setup=debug,lanbridge_core=debug,info"
    } else {
        "info"
    }
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (see [`default_filter`]).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
