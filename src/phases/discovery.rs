//! Phase 1: Discovery
//!
//! This is the heart of a run. It turns a root manifest into the flat
//! `path -> DependencyRecord` map by walking nested manifests until nothing
//! new appears.
//!
//! ## Process
//!
//! The frontier is an explicit queue of pending declarations, each carrying
//! the merged variable context of the manifest that declared it. One
//! *pass* drains the whole frontier:
//!
//! 1.  **Claim**: in frontier order, each declaration is dropped if its path
//!     is on the skip list or its condition is false. A path that is already
//!     resolved, claimed earlier in the pass, or skipped as unsupported must
//!     be declared identically, otherwise the run fails with
//!     `ConflictingDependency`. Blobs are recorded
//!     straight away; unsupported kinds become warnings; git sources are
//!     claimed.
//!
//! 2.  **Fetch**: every distinct claimed revision is fetched in parallel
//!     through the cache (`phases::fetch`), joining before the pass goes on.
//!
//! 3.  **Materialize**: in path order, each claimed dependency is linked into
//!     the workspace, recorded, and checked for a nested manifest whose
//!     declarations go back on the frontier.
//!
//! The loop ends when a pass leaves the frontier empty. Depth is unbounded
//! but finite: a path is recorded at most once, so a manifest that declares
//! its own ancestor is deduplicated instead of refetched.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use super::fetch::{self, FetchJob};
use super::{DependencyRecord, Resolution, ResolutionStats, ResolutionWarning, ResolvedSource};
use crate::cache::{CacheEntry, ContentCache};
use crate::cancel::CancellationToken;
use crate::condition::ConditionEvaluator;
use crate::context::VariableContext;
use crate::defaults;
use crate::error::{Error, Result};
use crate::fetcher::{FetchRequest, SourceFetcher};
use crate::filesystem::{check_workspace_path, contains_manifest, link_tree, SkipList};
use crate::manifest::{DeclaredSource, DependencyDeclaration, ManifestParser, ParsedManifest};

/// Origin label for declarations of the root manifest
pub const ROOT_ORIGIN: &str = "<root>";

/// Knobs for one resolver
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Directory dependency paths are materialized under
    pub workspace_root: PathBuf,
    /// File name of nested manifests
    pub manifest_name: String,
    pub skip: SkipList,
    /// Worker pool size for fetches
    pub jobs: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            manifest_name: defaults::DEFAULT_MANIFEST_NAME.to_string(),
            skip: SkipList::default(),
            jobs: defaults::default_jobs(),
        }
    }
}

/// A declaration waiting on the frontier
#[derive(Debug, Clone)]
struct PendingDeclaration {
    declaration: DependencyDeclaration,
    /// Merged context of the declaring manifest
    context: Arc<VariableContext>,
    /// Path of the dependency whose manifest declared this, or `<root>`
    origin: String,
}

/// A git dependency claimed during the current pass
#[derive(Debug, Clone)]
struct Claim {
    url: String,
    revision: String,
    origin: String,
}

#[derive(Debug, Default)]
struct RunState {
    records: BTreeMap<String, DependencyRecord>,
    origins: BTreeMap<String, String>,
    warnings: BTreeMap<String, ResolutionWarning>,
    /// Unsupported declarations behind `warnings`, kept for conflict checks
    unsupported: BTreeMap<String, DeclaredSource>,
    stats: ResolutionStats,
}

/// Drives manifests, conditions, the cache and the fetcher to a fixpoint.
pub struct DependencyResolver<'a> {
    fetcher: &'a dyn SourceFetcher,
    evaluator: &'a dyn ConditionEvaluator,
    cache: &'a ContentCache,
    options: ResolverOptions,
    cancel: CancellationToken,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        fetcher: &'a dyn SourceFetcher,
        evaluator: &'a dyn ConditionEvaluator,
        cache: &'a ContentCache,
        options: ResolverOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            cache,
            options,
            cancel,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves everything reachable from the root manifest text.
    pub fn resolve(&self, root_manifest: &str, base: &VariableContext) -> Result<Resolution> {
        let root = self.parser().parse(ROOT_ORIGIN, root_manifest, base)?;
        self.run(root, base)
    }

    /// Resolves everything reachable from the root manifest at `path`.
    pub fn resolve_file(&self, path: &Path, base: &VariableContext) -> Result<Resolution> {
        let root = self.parser().parse_file(path, base)?;
        self.run(root, base)
    }

    /// Fetches (or reuses) one pinned checkout and links it to `path`.
    ///
    /// Used to bootstrap the root checkout before its manifest is read.
    /// Returns `true` if the fetcher had to be called.
    pub fn checkout(&self, path: &str, url: &str, revision: &str) -> Result<bool> {
        check_workspace_path(path).map_err(|message| Error::Materialize {
            path: path.to_string(),
            message,
        })?;
        self.cancel.check()?;
        let lookup = self.cache.get_or_fetch(revision, |destination| {
            let request = FetchRequest {
                url: url.to_string(),
                revision: revision.to_string(),
                destination: destination.to_path_buf(),
                recursive: true,
            };
            let fetched = self.fetcher.fetch(&request, &self.cancel)?;
            Ok(CacheEntry {
                local_copy: fetched.local_copy,
                content_hash: fetched.content_hash,
            })
        })?;
        link_tree(
            &lookup.entry().local_copy,
            &self.options.workspace_root.join(path),
        )?;
        Ok(lookup.was_fetched())
    }

    fn parser(&self) -> ManifestParser<'_> {
        ManifestParser::new(self.evaluator)
    }

    fn run(&self, root: ParsedManifest, base: &VariableContext) -> Result<Resolution> {
        let pool = fetch::build_pool(self.options.jobs)?;
        let parser = self.parser();
        let mut state = RunState::default();
        let mut frontier = VecDeque::new();
        enqueue(&mut frontier, root, ROOT_ORIGIN, None)?;

        while !frontier.is_empty() {
            self.cancel.check()?;
            state.stats.passes += 1;
            info!(
                "Pass {}: {} pending declarations",
                state.stats.passes,
                frontier.len()
            );

            let claims = self.claim(&mut frontier, &mut state)?;
            if claims.is_empty() {
                continue;
            }

            let jobs = distinct_jobs(&claims);
            let fetched = fetch::execute(&jobs, self.fetcher, self.cache, &pool, &self.cancel)?;
            state.stats.fetches += fetched.fetched;
            state.stats.cache_hits += fetched.cache_hits;
            self.cancel.check()?;

            for (path, claim) in claims {
                let entry = fetched.entries.get(&claim.revision).ok_or_else(|| {
                    Error::Materialize {
                        path: path.clone(),
                        message: format!("no cache entry for revision {}", claim.revision),
                    }
                })?;
                let destination = self.options.workspace_root.join(&path);
                link_tree(&entry.local_copy, &destination)?;
                debug!("Materialized {} at {}", path, destination.display());

                state.records.insert(
                    path.clone(),
                    DependencyRecord {
                        path: path.clone(),
                        source: ResolvedSource::Git {
                            url: claim.url,
                            revision: claim.revision,
                            content_hash: entry.content_hash.clone(),
                        },
                    },
                );
                state.origins.insert(path.clone(), claim.origin);

                if contains_manifest(&destination, &self.options.manifest_name) {
                    let nested =
                        parser.parse_file(&destination.join(&self.options.manifest_name), base)?;
                    debug!(
                        "{} declares {} nested dependencies",
                        path,
                        nested.declarations.len()
                    );
                    enqueue(&mut frontier, nested, &path, Some(&path))?;
                }
            }
        }

        info!(
            "Resolved {} dependencies in {} passes ({} fetched, {} from cache)",
            state.records.len(),
            state.stats.passes,
            state.stats.fetches,
            state.stats.cache_hits
        );
        Ok(Resolution {
            records: state.records,
            warnings: state.warnings.into_values().collect(),
            stats: state.stats,
        })
    }

    /// Drains the frontier, returning the git dependencies to fetch this pass.
    fn claim(
        &self,
        frontier: &mut VecDeque<PendingDeclaration>,
        state: &mut RunState,
    ) -> Result<BTreeMap<String, Claim>> {
        let mut claims: BTreeMap<String, Claim> = BTreeMap::new();

        while let Some(pending) = frontier.pop_front() {
            let PendingDeclaration {
                declaration,
                context,
                origin,
            } = pending;
            let path = declaration.path;

            if self.options.skip.matches(&path) {
                debug!("Skipping {} (skip list)", path);
                continue;
            }
            if let Some(condition) = &declaration.condition {
                if !self.evaluator.evaluate(condition, &context)? {
                    debug!("Skipping {} (condition '{}' is false)", path, condition);
                    continue;
                }
            }

            if let Some(existing) = state.records.get(&path) {
                if !existing.source.matches(&declaration.source) {
                    return Err(conflict(
                        &path,
                        existing.source.describe(),
                        state.origins.get(&path).map(String::as_str),
                        &declaration.source,
                        &origin,
                    ));
                }
                debug!("{} already resolved, ignoring duplicate from {}", path, origin);
                continue;
            }
            if let Some(existing) = claims.get(&path) {
                let same = matches!(
                    &declaration.source,
                    DeclaredSource::Git { url, revision }
                        if *url == existing.url && *revision == existing.revision
                );
                if !same {
                    return Err(conflict(
                        &path,
                        format!("{}@{}", existing.url, existing.revision),
                        Some(&existing.origin),
                        &declaration.source,
                        &origin,
                    ));
                }
                continue;
            }
            if let Some(existing) = state.unsupported.get(&path) {
                if *existing != declaration.source {
                    return Err(conflict(
                        &path,
                        existing.describe(),
                        state.origins.get(&path).map(String::as_str),
                        &declaration.source,
                        &origin,
                    ));
                }
                continue;
            }

            match declaration.source {
                DeclaredSource::Git { url, revision } => {
                    claims.insert(
                        path,
                        Claim {
                            url,
                            revision,
                            origin,
                        },
                    );
                }
                DeclaredSource::Blob { url, digest } => {
                    state.origins.insert(path.clone(), origin);
                    state.records.insert(
                        path.clone(),
                        DependencyRecord {
                            path,
                            source: ResolvedSource::Blob { url, digest },
                        },
                    );
                }
                DeclaredSource::Unsupported { dep_type, reason } => {
                    warn!(
                        "Skipping unsupported {} dependency at {} ({})",
                        dep_type, path, reason
                    );
                    state.origins.insert(path.clone(), origin);
                    state.unsupported.insert(
                        path.clone(),
                        DeclaredSource::Unsupported {
                            dep_type: dep_type.clone(),
                            reason: reason.clone(),
                        },
                    );
                    state.warnings.insert(
                        path.clone(),
                        ResolutionWarning::UnsupportedKind {
                            path,
                            dep_type,
                            reason,
                        },
                    );
                }
            }
        }
        Ok(claims)
    }
}

fn conflict(
    path: &str,
    existing: String,
    existing_origin: Option<&str>,
    declared: &DeclaredSource,
    origin: &str,
) -> Error {
    Error::ConflictingDependency {
        path: path.to_string(),
        existing: match existing_origin {
            Some(from) => format!("{} (declared by {})", existing, from),
            None => existing,
        },
        conflicting: format!("{} (declared by {})", declared.describe(), origin),
    }
}

/// One job per distinct revision, in path order of first use
fn distinct_jobs(claims: &BTreeMap<String, Claim>) -> Vec<FetchJob> {
    let mut jobs: Vec<FetchJob> = Vec::new();
    for claim in claims.values() {
        if !jobs.iter().any(|j| j.revision == claim.revision) {
            jobs.push(FetchJob {
                url: claim.url.clone(),
                revision: claim.revision.clone(),
            });
        }
    }
    jobs
}

fn enqueue(
    frontier: &mut VecDeque<PendingDeclaration>,
    manifest: ParsedManifest,
    origin: &str,
    parent_path: Option<&str>,
) -> Result<()> {
    let context = Arc::new(manifest.context);
    let relative = manifest.use_relative_paths;
    for mut declaration in manifest.declarations {
        if let (true, Some(parent)) = (relative, parent_path) {
            declaration.path = format!("{}/{}", parent, declaration.path);
        }
        check_workspace_path(&declaration.path).map_err(|message| {
            Error::malformed(origin, format!("dependency path {}", message))
        })?;
        frontier.push_back(PendingDeclaration {
            declaration,
            context: Arc::clone(&context),
            origin: origin.to_string(),
        });
    }
    Ok(())
}
