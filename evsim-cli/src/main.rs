//! ## evsim-cli
//! **Scenario runner for the evsim engine**
//! Builds a simulator from layered configuration, runs one of the reference
//! scenarios and prints a report with a reproducible trace digest.
//!
//! ### Expectations:
//! - Identical digests for identical seeds on every scheduler backend
//! - Non-zero exit when `--expect-digest` does not match

use clap::Parser;

mod commands;
mod error;
mod scenarios;
mod trace;

use commands::Cli;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    commands::run_command(Cli::parse())?;
    Ok(())
}
