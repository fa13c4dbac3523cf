//! feedstream — poll RSS and Atom feeds and print their entries to stdout.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐  URIs   ┌─────────────┐  Items  ┌───────────┐
//! │ poll.rs  │ ──────► │ pipeline.rs │ ──────► │  stdout   │
//! │ (tick +  │ (root   │ (fetch, XML,│ (output │ (one line │
//! │ deadline)│ subject)│ Atom, RSS)  │  loop)  │ per item) │
//! └──────────┘         └─────────────┘         └───────────┘
//! ```
//!
//! * **`rx`** — the push-based stream primitive and its schedulers.
//! * **`source/`** — one stage per file: HTTP, Content-Type, XML, Atom, RSS,
//!   plus the unified [`source::Item`].
//! * **`pipeline`** — wires the stages into two item branches.
//! * **`poll`** — ticks the URIs into the pipeline and enforces the deadline.
//! * **`config`** — command-line flags.
//! * **`main`** — sets up logging, parses args, and runs the harness.

mod config;
mod error;
mod pipeline;
mod poll;
mod rx;
mod source;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Cli, Config};
use source::{Fetch, HttpClient};

fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout carries only items.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = match Config::try_from(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            println!("error: {e}");
            println!("{}", Cli::command().render_usage());
            return Ok(ExitCode::from(1));
        }
    };

    // Held here so the HTTP client is torn down on this thread, not inside
    // the pipeline's runtimes.
    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpClient::new(config.timeout).context("failed to build HTTP client")?);

    let outcome = poll::run(&config, fetcher.clone(), |item| println!("{item}"))?;
    info!(items = outcome.items, "run finished");
    if let Some(e) = outcome.error {
        eprintln!("{e}");
    }

    println!("exiting");
    Ok(ExitCode::SUCCESS)
}
