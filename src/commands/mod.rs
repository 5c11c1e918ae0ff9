//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `deps-vendor` command-line tool. Each subcommand is defined in its own
//! file.
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `deps_vendor` library.
//!
//! Flags shared by several commands live here.

pub mod cache;
pub mod resolve;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use deps_vendor::config::{self, VendorConfig};
use deps_vendor::context::VarValue;
use deps_vendor::defaults;
use deps_vendor::suggestions;

/// Platform selection and variable overrides
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Target operating system (repeatable), e.g. unix, android, win
    #[arg(long = "target-os", value_name = "OS")]
    pub target_os: Vec<String>,

    /// Target CPU (repeatable), e.g. x64, arm64
    #[arg(long = "target-cpu", value_name = "CPU")]
    pub target_cpu: Vec<String>,

    /// Set a variable (repeatable); beats platform flags and manifest defaults
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

impl TargetArgs {
    /// Applies the flags on top of `config`.
    pub fn apply_to(&self, config: &mut VendorConfig) -> Result<()> {
        if !self.target_os.is_empty() {
            config.target_os = Some(self.target_os.clone());
        }
        if !self.target_cpu.is_empty() {
            config.target_cpu = Some(self.target_cpu.clone());
        }
        for raw in &self.vars {
            let (name, value) = parse_var(raw)?;
            config.vars.insert(name, value);
        }
        Ok(())
    }
}

fn parse_var(raw: &str) -> Result<(String, VarValue)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), VarValue::parse_cli(value)))
        }
        _ => Err(suggestions::invalid_var(raw)),
    }
}

/// Loads the configuration for `workspace`.
///
/// An explicit path must exist; the implicit `.deps-vendor.yaml` is optional.
pub fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<VendorConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(suggestions::config_not_found(path));
            }
            Ok(config::from_file(path)?)
        }
        None => {
            let implicit = workspace.join(defaults::DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                Ok(config::from_file(&implicit)?)
            } else {
                Ok(VendorConfig::default())
            }
        }
    }
}

/// `--workspace`, or the current directory
pub fn workspace_or_cwd(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path),
        None => Ok(std::env::current_dir()?),
    }
}
