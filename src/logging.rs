//! Diagnostic logging.
//!
//! Logs go to stderr through `tracing`, filtered by `LOWE_LOG` (same syntax
//! as `RUST_LOG`, e.g. `LOWE_LOG=lowe_cli=debug`). The default shows
//! warnings and errors only, so the conversation on stdout stays clean.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "LOWE_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter())
        .try_init();
}
