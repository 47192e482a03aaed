//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep library crates lightweight.
//! Uses tracing with structured JSON output for machine-readable logs.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Targets that follow `-v`. Everything else (hyper, reqwest, notify) stays
/// at `warn` unless `RUST_LOG` says otherwise.
const TARGETS: &[&str] = &["demoserve", "demoserve_core", "tower_http"];

/// Initialize the tracing subscriber based on configuration.
///
/// # Arguments
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - If true, output stable JSON lines to stderr
///
/// Every command runs inside a span named after it carrying `cmd` and `cwd`,
/// so under `--json` a reload during `demoserve dev` reads:
/// ```json
/// {"timestamp":"...","level":"INFO","fields":{"message":"Page reload","path":"/App.vue"},"target":"demoserve::commands::dev","span":{"cmd":"dev","cwd":"/work/cmk-frontend-vue","name":"dev"}}
/// ```
/// With `-v`, tower-http's per-request spans (`method`, `uri`) show up as well.
///
/// # Panics
/// Panics if the subscriber cannot be initialized (e.g., called twice).
pub fn init(verbosity: u8, json: bool) {
    let level = level_for(verbosity);

    // Support RUST_LOG env var, with verbosity flag as override
    let filter = TARGETS.iter().fold(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        |filter, target| filter.add_directive(format!("{target}={level}").parse().unwrap()),
    );

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}
