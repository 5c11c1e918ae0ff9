//! # Resolve Command Implementation
//!
//! This module implements the `resolve` subcommand: it loads the
//! configuration, resolves the root manifest to a fixpoint and writes the
//! vendor file.
//!
//! ## Process
//!
//! 1.  **Configuration**: `.deps-vendor.yaml` (or `--config`) is loaded and
//!     the command-line flags are layered on top of it.
//! 2.  **Resolution**: `phases::orchestrator` fetches the root checkout (if
//!     configured), walks every reachable manifest and appends sidecar blobs.
//!     Fetches go through the content cache and are retried on transient
//!     failures.
//! 3.  **Emission**: The records are rendered as Nix (default) or JSON to
//!     stdout or `--output`.
//!
//! Unsupported dependencies are reported on stderr; with `--deny-warnings`
//! they fail the run instead.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use log::debug;

use deps_vendor::cache::ContentCache;
use deps_vendor::cancel::CancellationToken;
use deps_vendor::condition::GclientConditions;
use deps_vendor::config::VendorConfig;
use deps_vendor::defaults;
use deps_vendor::emit::{self, EmitOptions, OutputFormat};
use deps_vendor::error::Error;
use deps_vendor::fetcher::RetryingFetcher;
use deps_vendor::git::NixPrefetchGit;
use deps_vendor::output::{emoji, spinner, OutputConfig};
use deps_vendor::phases::{orchestrator, Outcome, Resolution};
use deps_vendor::suggestions;

use super::TargetArgs;

/// Vendor file syntax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    #[default]
    Nix,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Nix => OutputFormat::Nix,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Resolve the dependency tree and write the vendor file
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the configuration file.
    ///
    /// Defaults to `.deps-vendor.yaml` in the workspace, if present.
    #[arg(short, long, value_name = "FILE", env = "DEPS_VENDOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the dependency tree is materialized in (defaults to the current directory)
    #[arg(short, long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// The root directory for the revision cache.
    ///
    /// If not provided, it defaults to the system's cache directory
    /// (e.g., `~/.cache/deps-vendor` on Linux).
    /// Can also be set with the `DEPS_VENDOR_CACHE` environment variable.
    #[arg(long, value_name = "DIR", env = "DEPS_VENDOR_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Root manifest, relative to the workspace (default: src/DEPS)
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Additional path or glob to leave out (repeatable)
    #[arg(long, value_name = "PATH")]
    pub skip: Vec<String>,

    /// Number of parallel fetches
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Nix)]
    pub format: FormatArg,

    /// Write the vendor file here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fail instead of skipping unsupported dependencies
    #[arg(long)]
    pub deny_warnings: bool,

    /// Suppress the progress spinner and summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `resolve` command.
pub fn execute(args: ResolveArgs, out: &OutputConfig) -> Result<()> {
    let workspace = super::workspace_or_cwd(args.workspace.clone())?;
    let config = effective_config(&args, &workspace)?;
    debug!("Effective configuration: {:?}", config);

    if config.root.is_none() {
        let manifest = workspace.join(config.manifest_path());
        if !manifest.is_file() {
            return Err(suggestions::manifest_not_found(&manifest));
        }
    }

    let cache_root = args
        .cache_root
        .clone()
        .unwrap_or_else(defaults::default_cache_root);
    let cache = ContentCache::open(&cache_root)
        .with_context(|| format!("Failed to open cache at {}", cache_root.display()))?;

    let fetcher = RetryingFetcher::new(
        NixPrefetchGit::new(&config.fetch.program, &config.fetch.hash_program),
        config.fetch.retry_policy(),
    );
    let cancel = match config.timeout() {
        Some(timeout) => CancellationToken::with_timeout(timeout),
        None => CancellationToken::new(),
    };

    let progress = spinner(args.quiet, "Resolving dependencies");
    let result = orchestrator::execute(
        &config,
        &workspace,
        &fetcher,
        &GclientConditions,
        &cache,
        cancel,
    );
    progress.finish_and_clear();
    let resolution = result.map_err(|e| explain(e, &config))?;

    report_warnings(&resolution, out);
    if args.deny_warnings && resolution.outcome() == Outcome::CompleteWithWarnings {
        return Err(suggestions::warnings_denied(resolution.warnings.len()));
    }

    let rendered = emit::emit(
        &resolution,
        &EmitOptions {
            format: args.format.into(),
            header: Some(config.header()),
        },
    )?;
    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", rendered),
    }

    if !args.quiet {
        print_summary(&resolution, out);
    }
    Ok(())
}

/// The configuration file with the command-line flags applied
fn effective_config(args: &ResolveArgs, workspace: &std::path::Path) -> Result<VendorConfig> {
    let mut config = super::load_config(args.config.as_deref(), workspace)?;
    args.targets.apply_to(&mut config)?;
    if let Some(manifest) = &args.manifest {
        config.manifest = Some(manifest.clone());
    }
    if !args.skip.is_empty() {
        let mut skip = config.skip.take().unwrap_or_else(defaults::default_skip);
        skip.extend(args.skip.iter().cloned());
        config.skip = Some(skip);
    }
    if args.jobs.is_some() {
        config.jobs = args.jobs;
    }
    if args.timeout.is_some() {
        config.timeout = args.timeout;
    }
    Ok(config)
}

/// Attaches hints to the failures an operator can act on.
fn explain(error: Error, config: &VendorConfig) -> anyhow::Error {
    match error {
        Error::ConflictingDependency {
            path,
            existing,
            conflicting,
        } => suggestions::conflicting_dependency(&path, &existing, &conflicting),
        Error::FetchFailure { message, .. } if missing_tool(&message).is_some() => {
            let program = missing_tool(&message).unwrap_or_default();
            suggestions::fetch_tool_missing(program, &message)
        }
        Error::Cancelled => match config.timeout {
            Some(secs) => anyhow::anyhow!("Resolution cancelled after the {}s timeout", secs),
            None => Error::Cancelled.into(),
        },
        other => other.into(),
    }
}

/// The program named by a "failed to run <program>: ..." fetch failure
fn missing_tool(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("failed to run ")?;
    rest.split(':').next()
}

fn report_warnings(resolution: &Resolution, out: &OutputConfig) {
    for warning in &resolution.warnings {
        eprintln!(
            "{} {}",
            emoji(out, "⚠️ ", "warning:"),
            out.warning(&warning.to_string())
        );
    }
}

fn print_summary(resolution: &Resolution, out: &OutputConfig) {
    let stats = resolution.stats;
    eprintln!(
        "{} {}",
        emoji(out, "✅", "[OK]"),
        out.success(&format!("Resolved {} dependencies", resolution.len()))
    );
    eprintln!(
        "{}",
        out.dim(&format!(
            "   {} passes, {} fetched, {} from cache, {} skipped",
            stats.passes,
            stats.fetches,
            stats.cache_hits,
            resolution.warnings.len()
        ))
    );
}
