//! # Configuration Schema and Parsing
//!
//! This module defines the `.deps-vendor.yaml` configuration file. Every
//! field is optional; an absent file behaves like an empty one.
//!
//! ```yaml
//! target_os: [linux, android]
//! target_cpu: [x64]
//! vars:
//!   checkout_nacl: false
//! skip: [src, "src/third_party/*/testdata"]
//! root:
//!   path: src
//!   url: https://chromium.googlesource.com/chromium/src.git
//!   revision: 4f1a2b3c
//! sidecar_blobs:
//!   - path: src/third_party/node/node_modules
//!     bucket: chromium-nodejs
//! jobs: 8
//! timeout: 3600
//! fetch:
//!   attempts: 5
//! ```
//!
//! ## Precedence
//!
//! Command-line flags override the file; the file overrides the built-in
//! defaults in [`crate::defaults`]. Unknown keys are rejected so that a typo
//! cannot silently change which dependencies are resolved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{TargetSelection, VarValue};
use crate::defaults;
use crate::error::{Error, Result};
use crate::fetcher::RetryPolicy;
use crate::filesystem::{check_workspace_path, SkipList};
use crate::suggestions;

/// Top-level keys, for typo suggestions
const KNOWN_KEYS: &[&str] = &[
    "target_os",
    "target_cpu",
    "host_os",
    "host_cpu",
    "vars",
    "skip",
    "manifest",
    "manifest_name",
    "label",
    "root",
    "sidecar_blobs",
    "jobs",
    "timeout",
    "fetch",
];

/// Root checkout fetched before its manifest is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootCheckout {
    /// Workspace-relative checkout path, usually `src`
    pub path: String,
    pub url: String,
    pub revision: String,
}

/// An archive whose sha1 lives in `<path>.tar.gz.sha1` inside the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarBlob {
    pub path: String,
    /// Storage bucket holding `<sha1>` objects
    pub bucket: String,
}

/// Settings for the default fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    /// Prefetch program, invoked like `nix-prefetch-git`
    pub program: String,
    /// Program providing `hash-path`, invoked like `nix`
    pub hash_program: String,
    /// Total attempts per revision
    pub attempts: u32,
    /// First retry delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Retry delay cap in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            program: "nix-prefetch-git".to_string(),
            hash_program: "nix".to_string(),
            attempts: policy.attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl FetchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// The `.deps-vendor.yaml` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    pub target_os: Option<Vec<String>>,
    pub target_cpu: Option<Vec<String>>,
    pub host_os: Option<String>,
    pub host_cpu: Option<String>,
    /// Explicit variables; they override the platform flags
    pub vars: BTreeMap<String, VarValue>,
    /// Paths (or glob patterns) never resolved
    pub skip: Option<Vec<String>>,
    /// Root manifest, relative to the workspace
    pub manifest: Option<PathBuf>,
    /// File name of nested manifests
    pub manifest_name: Option<String>,
    /// Free-form label for the generated header, e.g. a release version
    pub label: Option<String>,
    pub root: Option<RootCheckout>,
    pub sidecar_blobs: Vec<SidecarBlob>,
    pub jobs: Option<usize>,
    /// Whole-run timeout in seconds
    pub timeout: Option<u64>,
    pub fetch: FetchSettings,
}

/// Parses a YAML string into a `VendorConfig`.
pub fn parse(yaml_content: &str) -> Result<VendorConfig> {
    if yaml_content.trim().is_empty() {
        return Ok(VendorConfig::default());
    }
    let config: VendorConfig = serde_yaml::from_str(yaml_content).map_err(|e| {
        let message = e.to_string();
        let hint = unknown_field(&message)
            .and_then(|field| suggestions::find_similar(field, KNOWN_KEYS))
            .map(|s| format!("did you mean '{}'?", s));
        Error::ConfigParse { message, hint }
    })?;
    config.check_paths()?;
    Ok(config)
}

/// Parse a `VendorConfig` from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<VendorConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Extracts `x` from serde's "unknown field `x`" message
fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.split("unknown field `").nth(1)?;
    rest.split('`').next()
}

impl VendorConfig {
    /// Rejects `root.path` and sidecar paths that leave the workspace.
    fn check_paths(&self) -> Result<()> {
        let root = self.root.iter().map(|r| ("root.path", r.path.as_str()));
        let sidecars = self
            .sidecar_blobs
            .iter()
            .map(|b| ("sidecar_blobs[].path", b.path.as_str()));
        for (key, path) in root.chain(sidecars) {
            check_workspace_path(path).map_err(|message| Error::ConfigParse {
                message: format!("{}: {}", key, message),
                hint: Some("paths are relative to the workspace and may not contain '..'".into()),
            })?;
        }
        Ok(())
    }

    /// The platform selection, with defaults for unset fields
    pub fn targets(&self) -> TargetSelection {
        let defaults = TargetSelection::default();
        TargetSelection {
            target_os: self.target_os.clone().unwrap_or(defaults.target_os),
            target_cpu: self.target_cpu.clone().unwrap_or(defaults.target_cpu),
            host_os: self.host_os.clone().unwrap_or(defaults.host_os),
            host_cpu: self.host_cpu.clone().unwrap_or(defaults.host_cpu),
        }
    }

    pub fn skip_list(&self) -> Result<SkipList> {
        match &self.skip {
            Some(skip) => SkipList::new(skip),
            None => SkipList::new(defaults::default_skip()),
        }
    }

    pub fn manifest_name(&self) -> &str {
        self.manifest_name
            .as_deref()
            .unwrap_or(defaults::DEFAULT_MANIFEST_NAME)
    }

    /// Root manifest path relative to the workspace.
    ///
    /// Defaults to the manifest inside the root checkout (`src/DEPS`).
    pub fn manifest_path(&self) -> PathBuf {
        match &self.manifest {
            Some(path) => path.clone(),
            None => {
                let root = self.root.as_ref().map_or("src", |r| r.path.as_str());
                Path::new(root).join(self.manifest_name())
            }
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(defaults::default_jobs).max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Text after `# ` on the first line of the vendor file
    pub fn header(&self) -> String {
        let label = self
            .label
            .clone()
            .or_else(|| self.root.as_ref().map(|r| r.revision.clone()));
        let generator = match label {
            Some(label) => format!("{} {}", defaults::GENERATOR_NAME, label),
            None => defaults::GENERATOR_NAME.to_string(),
        };
        format!(
            "GENERATED BY '{}' for {}",
            generator,
            self.targets().target_os.join(", ")
        )
    }
}
