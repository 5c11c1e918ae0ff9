//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// deps-vendor - Resolve a DEPS tree into a pinned vendor file
#[derive(Parser, Debug)]
#[command(name = "deps-vendor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the root manifest and write the vendor file
    Resolve(commands::resolve::ResolveArgs),
    /// Parse one manifest and list the declarations that apply, without fetching
    Validate(commands::validate::ValidateArgs),
    /// Inspect or prune the revision cache
    Cache(commands::cache::CacheArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = deps_vendor::output::OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Resolve(args) => commands::resolve::execute(args, &output),
            Commands::Validate(args) => commands::validate::execute(args, &output),
            Commands::Cache(args) => commands::cache::execute(args, &output),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
