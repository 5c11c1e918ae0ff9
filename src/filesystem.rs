//! Workspace filesystem helpers: materializing cached copies and skip matching

use crate::error::{Error, Result};
use glob::Pattern;
use log::debug;
use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Mirror `source` into `destination` using hard links, like `cp -al`.
///
/// Any existing `destination` is replaced. Files that cannot be hard linked
/// (for example across filesystems) are copied instead. Symlinks are
/// recreated, not followed.
pub fn link_tree(source: &Path, destination: &Path) -> Result<()> {
    let materialize_err = |message: String| Error::Materialize {
        path: destination.display().to_string(),
        message,
    };

    if !source.is_dir() {
        return Err(materialize_err(format!(
            "cached copy {} is missing",
            source.display()
        )));
    }
    if fs::symlink_metadata(destination).is_ok() {
        remove_any(destination)?;
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut copied = 0usize;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| materialize_err(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| materialize_err(e.to_string()))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            make_symlink(&link, &target)?;
        } else if fs::hard_link(entry.path(), &target).is_err() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    if copied > 0 {
        debug!(
            "{} files under {} were copied instead of linked",
            copied,
            destination.display()
        );
    }
    Ok(())
}

fn remove_any(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    let resolved = target.parent().map(|p| p.join(link)).unwrap_or_default();
    if resolved.is_file() {
        fs::copy(&resolved, target)?;
    }
    Ok(())
}

/// Checks that `path` names a directory strictly below the workspace root.
///
/// Absolute paths, drive prefixes and `..` are rejected, as is a path made
/// only of `.`: joined to the workspace root, any of them would point
/// `link_tree` at a directory it must not replace.
pub fn check_workspace_path(path: &str) -> std::result::Result<(), String> {
    let mut named = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("'{}' climbs out of the workspace", path))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("'{}' is not a relative path", path))
            }
        }
    }
    if named {
        Ok(())
    } else {
        Err(format!("'{}' does not name a directory", path))
    }
}

/// `true` if `dir` holds a manifest file named `manifest_name`
pub fn contains_manifest(dir: &Path, manifest_name: &str) -> bool {
    dir.join(manifest_name).is_file()
}

/// Dependency paths excluded from resolution.
///
/// Entries are matched against the full workspace-relative path, either
/// exactly or as glob patterns (`third_party/*`).
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    exact: Vec<String>,
    patterns: Vec<Pattern>,
}

impl SkipList {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut skip = SkipList::default();
        for entry in entries {
            let entry = entry.as_ref().trim_end_matches('/');
            if entry.contains(['*', '?', '[']) {
                skip.patterns.push(Pattern::new(entry)?);
            } else {
                skip.exact.push(entry.to_string());
            }
        }
        Ok(skip)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|e| e == path) || self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}
