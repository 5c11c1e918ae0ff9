//! Errors that carry `hint:` lines.
//!
//! Every failure a user can fix themselves (a missing file, a bad flag, two
//! manifests disagreeing) goes through one of these constructors so the
//! message names the problem and the next thing to try:
//!
//! ```rust,ignore
//! return Err(suggestions::manifest_not_found(path));
//! ```

use std::path::Path;

/// A config path given with `--config` or `DEPS_VENDOR_CONFIG` does not exist.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create a .deps-vendor.yaml file in your workspace root\n\
         hint: Use -c/--config to specify a different path\n\
         hint: Set DEPS_VENDOR_CONFIG environment variable",
        path = path.display()
    )
}

pub fn manifest_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Root manifest not found: {path}\n\n\
         hint: Use --manifest to point at the DEPS file\n\
         hint: Add a 'root:' entry to .deps-vendor.yaml to fetch the root checkout first",
        path = path.display()
    )
}

/// `cache clean` needs `--all` or `--stale`.
pub fn cache_clean_no_filter() -> anyhow::Error {
    anyhow::anyhow!(
        "At least one filter must be specified for cache clean\n\n\
         hint: Use --all to remove every cached revision\n\
         hint: Use --stale to remove leftovers of interrupted fetches"
    )
}

/// `--var` was not of the form `NAME=VALUE`.
pub fn invalid_var(raw: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid variable assignment: {raw}\n\n\
         hint: Use --var NAME=VALUE, e.g. --var checkout_nacl=False\n\
         hint: True and False (any case) become booleans, anything else is a string"
    )
}

pub fn conflicting_dependency(path: &str, existing: &str, conflicting: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Conflicting dependency at {path}\n\
         first:  {existing}\n\
         second: {conflicting}\n\n\
         hint: Make both manifests agree on one revision\n\
         hint: Add the path to 'skip' in .deps-vendor.yaml to leave it out of the vendor file"
    )
}

/// The fetch program or the hash program could not be spawned.
pub fn fetch_tool_missing(program: &str, error: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Failed to run fetch tool '{program}'\n\
         error: {error}\n\n\
         hint: Install nix, which provides nix-prefetch-git and nix hash-path\n\
         hint: Set fetch.program / fetch.hash_program in .deps-vendor.yaml to use other tools"
    )
}

/// Unsupported-dependency warnings promoted to an error by `--deny-warnings`.
pub fn warnings_denied(count: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "{count} dependencies were skipped as unsupported\n\n\
         hint: Add the paths to 'skip' to acknowledge them\n\
         hint: Drop --deny-warnings to emit the vendor file anyway"
    )
}

/// Closest candidate to `input`, if one is within two edits.
pub fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, edit_distance(input, candidate)))
        .filter(|&(_, distance)| distance <= 2 && distance < input.len())
        .min_by_key(|&(_, distance)| distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance, computed one row at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitute.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
