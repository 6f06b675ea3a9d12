// src/telemetry.rs

//! Logging setup.
//!
//! `RUST_LOG` controls the filter. Logs go to stderr so report output on
//! stdout stays clean for piping.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,challenge_grader=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
