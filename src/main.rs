//! # deps-vendor
//!
//! Entry point of the `deps-vendor` binary. Argument parsing and dispatch
//! live in `cli`, one module per subcommand in `commands`; resolution
//! itself is the `deps_vendor` library. Errors surface through `anyhow`,
//! including the `hint:` lines attached by `deps_vendor::suggestions`.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    cli::Cli::parse().execute()
}
