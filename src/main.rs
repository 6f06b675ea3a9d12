// src/main.rs

//! grader
//!
//! Grades coding-challenge submissions: HTML & CSS structure checks and
//! JavaScript assertions run in a sandboxed Node child. Commands live in
//! `runner`; this file only wires the process up.

mod auth;
mod backend;
mod challenge;
mod checks;
mod cli;
mod config;
mod engine;
mod metrics;
mod preview;
mod run_id;
mod runner;
mod sandbox;
mod server;
mod shim;
mod sinks;
mod state;
mod telemetry;
mod timer;
mod util;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry GRADER_API_KEY and RUST_LOG
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = cli::Cli::parse();
    runner::run(cli).await
}
