//! # unirootfs CLI
//!
//! This is the binary entry point for the `unirootfs` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging from the global flags.
//! - Executing the appropriate command based on the parsed arguments.
//!
//! The core logic lives in the `unirootfs` library crate; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
