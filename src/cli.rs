//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use unirootfs::config::Config;
use unirootfs::logging;

use crate::commands;

/// unirootfs - Build unikernel root filesystems once per target architecture
#[derive(Parser, Debug)]
#[command(name = "unirootfs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "info",
        env = "UNIROOTFS_LOG_LEVEL"
    )]
    log_level: String,

    /// Set log type (fancy, basic, json)
    #[arg(
        long,
        global = true,
        value_name = "TYPE",
        default_value = "fancy",
        env = "UNIROOTFS_LOG_TYPE"
    )]
    log_type: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the rootfs for every distinct target architecture
    Build(commands::build::BuildArgs),

    /// Show the builds that would run, without running them
    Plan(commands::plan::PlanArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let config = Config::from_flags(&self.log_level, &self.log_type);
        logging::init(&config.log);

        match self.command {
            Commands::Build(args) => commands::build::execute(args, &self.color, &config),
            Commands::Plan(args) => commands::plan::execute(args, &self.color),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
