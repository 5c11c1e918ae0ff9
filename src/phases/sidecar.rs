//! Phase 3: Sidecar storage blobs
//!
//! Some checkouts carry archives that are not declared in any manifest;
//! instead a `<path>.tar.gz.sha1` file next to the target directory names
//! the archive by its sha1 in a storage bucket. The configured list of such
//! paths is appended to the resolution as blob records once every checkout
//! is in place.

use std::fs;
use std::path::Path;

use log::debug;

use super::{DependencyRecord, Resolution, ResolvedSource};
use crate::config::SidecarBlob;
use crate::error::{Error, Result};
use crate::filesystem::check_workspace_path;
use crate::manifest::Digest;

/// Host serving sidecar archives by sha1
const STORAGE_BASE_URL: &str = "https://commondatastorage.googleapis.com";

/// Executes Phase 3: adds one blob record per configured sidecar.
pub fn execute(
    blobs: &[SidecarBlob],
    workspace_root: &Path,
    resolution: &mut Resolution,
) -> Result<()> {
    for blob in blobs {
        let record = read_sidecar(blob, workspace_root)?;
        if let Some(existing) = resolution.records.get(&blob.path) {
            return Err(Error::ConflictingDependency {
                path: blob.path.clone(),
                existing: existing.source.describe(),
                conflicting: format!("{} (sidecar)", record.source.describe()),
            });
        }
        debug!("Sidecar blob {} -> {}", blob.path, record.source.describe());
        resolution.records.insert(blob.path.clone(), record);
    }
    Ok(())
}

fn read_sidecar(blob: &SidecarBlob, workspace_root: &Path) -> Result<DependencyRecord> {
    check_workspace_path(&blob.path).map_err(|message| Error::Sidecar {
        path: blob.path.clone(),
        message,
    })?;
    let sidecar = workspace_root.join(format!("{}.tar.gz.sha1", blob.path));
    let sidecar_err = |message: String| Error::Sidecar {
        path: sidecar.display().to_string(),
        message,
    };

    let sha1 = fs::read_to_string(&sidecar)
        .map_err(|e| sidecar_err(e.to_string()))?
        .trim()
        .to_string();
    if sha1.len() != 40 || !sha1.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(sidecar_err(format!("'{}' is not a sha1 digest", sha1)));
    }

    Ok(DependencyRecord {
        path: blob.path.clone(),
        source: ResolvedSource::Blob {
            url: format!("{}/{}/{}", STORAGE_BASE_URL, blob.bucket, sha1),
            digest: Digest::sha1(sha1),
        },
    })
}
