//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures and a scripted fetcher so the
//! resolver can be driven end to end without network access or nix.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_file("src/DEPS", "deps = {}");
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use deps_vendor::cancel::CancellationToken;
use deps_vendor::error::Result;
use deps_vendor::fetcher::{FetchRequest, FetchedSource, SourceFetcher};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    #[allow(unused_imports)]
    pub use super::{FakeFetcher, TestFixture};
}

/// Manifest snippets shared by several tests.
#[allow(dead_code)]
pub mod manifests {
    /// A, plus B gated on checkout_linux
    pub const ROOT: &str = r#"
vars = {
  'git': 'https://git.example',
}

deps = {
  'src/a': Var('git') + '/a.git' + '@' + 'R1',
  'src/b': {
    'url': '{git}/b.git@R2',
    'condition': 'checkout_linux',
  },
}
"#;

    /// What A's checkout carries
    pub const NESTED_IN_A: &str = r#"
deps = {
  'src/c': 'https://git.example/c.git@R3',
}
"#;

    /// Only entries that never reach the fetcher
    pub const OFFLINE: &str = r#"
vars = {
  'checkout_nacl': False,
}

deps = {
  'src/third_party/nacl': {
    'url': 'https://git.example/nacl.git@0000',
    'condition': 'checkout_nacl',
  },
  'src/third_party/test_fonts': {
    'dep_type': 'gcs',
    'bucket': 'fonts-bucket',
    'objects': [
      {
        'object_name': 'fonts/9a8b7c6d',
        'sha256sum': 'a3f1e4b5c6d7e8f90123456789abcdef0123456789abcdef0123456789abcdef',
        'size_bytes': 1024,
        'generation': 1,
      },
    ],
  },
  'src/tools/luci-go': {
    'dep_type': 'cipd',
    'packages': [{'package': 'infra/tools/luci', 'version': 'git_revision:abc'}],
  },
}
"#;
}

/// A fetcher serving revisions from an in-memory table.
///
/// Each revision maps to the files its checkout contains. Every call is
/// recorded so tests can assert how often the network would have been hit.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeFetcher {
    trees: HashMap<String, Vec<(String, String)>>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision `revision` contains `file` with `content`.
    pub fn with_file(mut self, revision: &str, file: &str, content: &str) -> Self {
        self.trees
            .entry(revision.to_string())
            .or_default()
            .push((file.to_string(), content.to_string()));
        self
    }

    /// Revisions fetched so far, sorted
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The hash this fetcher reports for `revision`
    pub fn hash_of(revision: &str) -> String {
        format!("{:0>52}", revision.to_lowercase())
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedSource> {
        cancel.check()?;
        self.calls.lock().unwrap().push(request.revision.clone());
        fs::create_dir_all(&request.destination)?;
        fs::write(request.destination.join("README"), &request.url)?;
        for (file, content) in self.trees.get(&request.revision).into_iter().flatten() {
            let target = request.destination.join(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
        }
        Ok(FetchedSource {
            local_copy: request.destination.clone(),
            content_hash: Self::hash_of(&request.revision),
        })
    }
}

/// A test fixture that provides a temporary workspace and cache.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new().with_file("src/DEPS", manifests::OFFLINE);
///
/// let mut cmd = fixture.command();
/// cmd.arg("validate").assert().success();
/// ```
#[allow(dead_code)]
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `.deps-vendor.yaml` configuration file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.with_file(".deps-vendor.yaml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// The workspace directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A cache directory next to (not inside) the materialized tree
    pub fn cache_root(&self) -> std::path::PathBuf {
        self.temp_dir.path().join(".cache")
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// The `deps-vendor` binary, run inside the workspace with an isolated cache.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("deps-vendor");
        cmd.current_dir(self.path())
            .env("DEPS_VENDOR_CACHE", self.cache_root())
            .env_remove("DEPS_VENDOR_CONFIG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
