//! YouStrict - timed, parent-approved video sessions for children.
//!
//! A parent picks how long the child may watch, solves a quick arithmetic
//! check, and a session starts. The session is persisted so it survives
//! restarts, a one-second countdown drives the UI, and a navigation guard
//! keeps the video screens unreachable once time is up.
//!
//! Architecture:
//! - CLI is a thin client that talks to the local server via HTTP
//! - Server owns the one session controller and the secure store
//! - All session state changes go through the controller

mod challenge;
mod cli;
mod clock;
mod config;
mod guard;
mod models;
mod server;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

/// Logs go to stderr. `RUST_LOG` filters; `YOUSTRICT_DEBUG_LOG` forces debug.
fn init_logging() {
    let debug_enabled = std::env::var("YOUSTRICT_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("youstrict=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    execute(cli).await
}
