//! Default values for deps-vendor configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Name of the configuration file looked up in the workspace
pub const DEFAULT_CONFIG_FILE: &str = ".deps-vendor.yaml";

/// File name of nested manifests
pub const DEFAULT_MANIFEST_NAME: &str = "DEPS";

/// Header line prefix of generated vendor files
pub const GENERATOR_NAME: &str = "deps-vendor";

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/deps-vendor` (XDG Base Directory)
/// - macOS: `~/Library/Caches/deps-vendor`
/// - Windows: `{FOLDERID_LocalAppData}\deps-vendor`
///
/// Falls back to `.deps-vendor-cache` in the current directory if the
/// platform cache directory cannot be determined.
///
/// This can be overridden by the `--cache-root` CLI flag or the
/// `DEPS_VENDOR_CACHE` environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".deps-vendor-cache"))
        .join("deps-vendor")
}

/// Paths never resolved: the root checkout is present by construction.
pub fn default_skip() -> Vec<String> {
    vec!["src".to_string()]
}

/// Fetch worker count: one per available core.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root_returns_path() {
        let cache_root = default_cache_root();
        assert!(cache_root.ends_with("deps-vendor"));
    }

    #[test]
    fn test_default_cache_root_is_absolute_or_fallback() {
        let cache_root = default_cache_root();
        // Either absolute (normal case) or relative fallback
        assert!(
            cache_root.is_absolute() || cache_root.starts_with(".deps-vendor-cache"),
            "Expected absolute path or fallback, got: {:?}",
            cache_root
        );
    }

    #[test]
    fn test_default_skip_excludes_root_checkout() {
        assert_eq!(default_skip(), vec!["src"]);
        assert!(default_jobs() >= 1);
    }
}
