//! The resolution pipeline.
//!
//! ## Overview
//!
//! A run goes through these phases:
//! 1. Discovery - Parse manifests, gate declarations by condition, detect conflicts
//!    and walk nested manifests until the frontier drains (`discovery`)
//! 2. Fetch - Within each discovery pass, fetch every cache-missing revision in
//!    parallel and join before the pass continues (`fetch`)
//! 3. Sidecar blobs - Append archives whose digests live in `.tar.gz.sha1`
//!    files inside the checkout (`sidecar`)
//!
//! `orchestrator` strings them together for the CLI. The emitted document is
//! produced from the resulting [`Resolution`] by [`crate::emit`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::Error;
use crate::manifest::{DeclaredSource, Digest};

pub mod discovery;
pub mod fetch;
pub mod orchestrator;
pub mod sidecar;

/// A pinned source that made it into the resolved set.
///
/// Unsupported kinds have no variant here, so they can never be emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolvedSource {
    Git {
        url: String,
        revision: String,
        #[serde(rename = "sha256")]
        content_hash: String,
    },
    Blob { url: String, digest: Digest },
}

impl ResolvedSource {
    /// `true` if `declared` pins the same content as this record.
    pub fn matches(&self, declared: &DeclaredSource) -> bool {
        match (self, declared) {
            (
                ResolvedSource::Git { url, revision, .. },
                DeclaredSource::Git {
                    url: declared_url,
                    revision: declared_revision,
                },
            ) => url == declared_url && revision == declared_revision,
            (
                ResolvedSource::Blob { url, digest },
                DeclaredSource::Blob {
                    url: declared_url,
                    digest: declared_digest,
                },
            ) => url == declared_url && digest == declared_digest,
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ResolvedSource::Git { url, revision, .. } => format!("{}@{}", url, revision),
            ResolvedSource::Blob { url, digest } => format!("{} ({})", url, digest),
        }
    }
}

/// One entry of the flat resolved set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub path: String,
    pub source: ResolvedSource,
}

/// A dependency that was skipped instead of failing the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    UnsupportedKind {
        path: String,
        dep_type: String,
        reason: String,
    },
}

impl ResolutionWarning {
    pub fn path(&self) -> &str {
        match self {
            ResolutionWarning::UnsupportedKind { path, .. } => path,
        }
    }

    /// The error this warning becomes under `--deny-warnings`.
    pub fn into_error(self) -> Error {
        match self {
            ResolutionWarning::UnsupportedKind { path, dep_type, .. } => {
                Error::UnsupportedKind { path, dep_type }
            }
        }
    }
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionWarning::UnsupportedKind {
                path,
                dep_type,
                reason,
            } => write!(
                f,
                "skipped {} dependency at {} ({})",
                dep_type, path, reason
            ),
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Discovery passes until the frontier drained
    pub passes: usize,
    /// Calls that reached the fetcher
    pub fetches: usize,
    /// Revisions served from the cache
    pub cache_hits: usize,
}

/// Whether a finished run needs auditing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    CompleteWithWarnings,
}

/// The flat, deduplicated result of a run
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Records keyed by path; iteration order is the emission order
    pub records: BTreeMap<String, DependencyRecord>,
    /// Skipped dependencies, sorted by path
    pub warnings: Vec<ResolutionWarning>,
    pub stats: ResolutionStats,
}

impl Resolution {
    pub fn outcome(&self) -> Outcome {
        if self.warnings.is_empty() {
            Outcome::Complete
        } else {
            Outcome::CompleteWithWarnings
        }
    }

    pub fn get(&self, path: &str) -> Option<&ResolvedSource> {
        self.records.get(path).map(|r| &r.source)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in lexicographic path order
    pub fn iter(&self) -> impl Iterator<Item = &DependencyRecord> {
        self.records.values()
    }
}
