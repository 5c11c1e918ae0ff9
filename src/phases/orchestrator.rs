//! Orchestrator for a complete resolution run
//!
//! This module coordinates all phases behind one call so the CLI (and
//! embedding applications) only provide a configuration, a workspace, a cache
//! and a fetcher.

use std::path::Path;

use log::info;

use super::discovery::{DependencyResolver, ResolverOptions};
use super::{sidecar, Resolution};
use crate::cache::ContentCache;
use crate::cancel::CancellationToken;
use crate::condition::ConditionEvaluator;
use crate::config::VendorConfig;
use crate::context::VariableContext;
use crate::error::Result;
use crate::fetcher::SourceFetcher;

/// The variable context a configuration resolves against
pub fn base_context(config: &VendorConfig) -> VariableContext {
    VariableContext::from_targets(&config.targets()).with_overrides(&config.vars)
}

/// Execute a complete run
///
/// 1. Fetch and link the root checkout, if one is configured
/// 2. Resolve the root manifest to a fixpoint (discovery + fetch)
/// 3. Append sidecar blobs
pub fn execute(
    config: &VendorConfig,
    workspace_root: &Path,
    fetcher: &dyn SourceFetcher,
    evaluator: &dyn ConditionEvaluator,
    cache: &ContentCache,
    cancel: CancellationToken,
) -> Result<Resolution> {
    let options = ResolverOptions {
        workspace_root: workspace_root.to_path_buf(),
        manifest_name: config.manifest_name().to_string(),
        skip: config.skip_list()?,
        jobs: config.jobs(),
    };
    let resolver = DependencyResolver::new(fetcher, evaluator, cache, options, cancel);
    let base = base_context(config);

    let mut bootstrap_fetched = None;
    if let Some(root) = &config.root {
        info!("Checking out root {} at {}", root.url, root.revision);
        bootstrap_fetched = Some(resolver.checkout(&root.path, &root.url, &root.revision)?);
    }

    let manifest = workspace_root.join(config.manifest_path());
    info!("Resolving {}", manifest.display());
    let mut resolution = resolver.resolve_file(&manifest, &base)?;

    match bootstrap_fetched {
        Some(true) => resolution.stats.fetches += 1,
        Some(false) => resolution.stats.cache_hits += 1,
        None => {}
    }

    sidecar::execute(&config.sidecar_blobs, workspace_root, &mut resolution)?;
    Ok(resolution)
}
