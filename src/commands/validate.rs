//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a single
//! manifest without fetching anything.
//!
//! ## Functionality
//!
//! - **Syntax**: The manifest is decoded with the same parser `resolve` uses.
//! - **Conditions**: Every condition is evaluated against the selected
//!   platform, so typos in variable names and malformed expressions surface
//!   before a long fetch run.
//! - **Report**: Each declaration is listed with what `resolve` would do
//!   with it.
//!
//! Nested manifests are not followed; they only exist after a fetch.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use deps_vendor::condition::{ConditionEvaluator, GclientConditions};
use deps_vendor::manifest::{DeclaredSource, ManifestParser};
use deps_vendor::output::{emoji, OutputConfig};
use deps_vendor::phases::orchestrator;
use deps_vendor::suggestions;

use super::TargetArgs;

/// Check a manifest and list the declarations that apply
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Manifest to check; defaults to the configured root manifest
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", env = "DEPS_VENDOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace the default manifest path is relative to
    #[arg(short, long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// What `resolve` would do with one declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Disposition {
    Fetch,
    Record,
    Skipped,
    ConditionFalse,
    Unsupported,
}

impl Disposition {
    fn label(self) -> &'static str {
        match self {
            Disposition::Fetch => "fetch",
            Disposition::Record => "record",
            Disposition::Skipped => "skipped",
            Disposition::ConditionFalse => "condition false",
            Disposition::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Serialize)]
struct DeclarationReport {
    path: String,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
    disposition: Disposition,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, out: &OutputConfig) -> Result<()> {
    let workspace = super::workspace_or_cwd(args.workspace.clone())?;
    let mut config = super::load_config(args.config.as_deref(), &workspace)?;
    args.targets.apply_to(&mut config)?;

    let manifest = args
        .manifest
        .clone()
        .unwrap_or_else(|| workspace.join(config.manifest_path()));
    if !manifest.is_file() {
        return Err(suggestions::manifest_not_found(&manifest));
    }

    let base = orchestrator::base_context(&config);
    let parsed = ManifestParser::new(&GclientConditions).parse_file(&manifest, &base)?;
    let skip = config.skip_list()?;

    let mut reports = Vec::with_capacity(parsed.declarations.len());
    for declaration in &parsed.declarations {
        let active = match &declaration.condition {
            Some(condition) => GclientConditions.evaluate(condition, &parsed.context)?,
            None => true,
        };
        let disposition = if skip.matches(&declaration.path) {
            Disposition::Skipped
        } else if !active {
            Disposition::ConditionFalse
        } else {
            match declaration.source {
                DeclaredSource::Git { .. } => Disposition::Fetch,
                DeclaredSource::Blob { .. } => Disposition::Record,
                DeclaredSource::Unsupported { .. } => Disposition::Unsupported,
            }
        };
        reports.push(DeclarationReport {
            path: declaration.path.clone(),
            source: declaration.source.describe(),
            condition: declaration.condition.clone(),
            disposition,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        let line = format!("{:<16} {}  {}", report.disposition.label(), report.path, report.source);
        match report.disposition {
            Disposition::Fetch | Disposition::Record => println!("{}", line),
            Disposition::Unsupported => println!("{}", out.warning(&line)),
            Disposition::Skipped | Disposition::ConditionFalse => println!("{}", out.dim(&line)),
        }
    }
    let count = |d: Disposition| reports.iter().filter(|r| r.disposition == d).count();
    println!();
    println!(
        "{} {} is valid: {} to fetch, {} recorded, {} inactive, {} unsupported",
        emoji(out, "✅", "[OK]"),
        manifest.display(),
        count(Disposition::Fetch),
        count(Disposition::Record),
        count(Disposition::Skipped) + count(Disposition::ConditionFalse),
        count(Disposition::Unsupported)
    );
    Ok(())
}
