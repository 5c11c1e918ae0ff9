//! Content-addressed cache of fetched revisions
//!
//! Every fetched revision lives under the cache root exactly once:
//!
//! ```text
//! <root>/<key>/          local copy produced by the fetcher
//! <root>/<key>.sha256    content hash, written last
//! ```
//!
//! `<key>` is the revision with every byte outside `[A-Za-z0-9_-]`
//! percent-escaped, so distinct revisions never share a key and a key never
//! contains the `.` that starts the hash and temp-file suffixes.
//!
//! The hash file is the commit marker. It is written atomically (temp file
//! plus rename) only after the fetch fully succeeded, so a crashed or failed
//! fetch never leaves a usable-looking entry behind. Entries are validated
//! lazily: a hash file whose copy directory has been pruned externally is
//! treated as absent and the revision is fetched again.
//!
//! The cache is keyed by revision rather than by checkout path, because the
//! same revision can be mounted at several paths of the dependency tree.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{Error, Result};

const HASH_SUFFIX: &str = ".sha256";

/// A cached revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Canonical location of the fetched copy
    pub local_copy: PathBuf,
    /// Content hash reported by the fetcher
    pub content_hash: String,
}

/// Outcome of [`ContentCache::get_or_fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Served from the cache; the fetcher was not called
    Hit(CacheEntry),
    /// Fetched during this call and stored
    Fetched(CacheEntry),
}

impl CacheLookup {
    pub fn entry(&self) -> &CacheEntry {
        match self {
            CacheLookup::Hit(entry) | CacheLookup::Fetched(entry) => entry,
        }
    }

    pub fn into_entry(self) -> CacheEntry {
        match self {
            CacheLookup::Hit(entry) | CacheLookup::Fetched(entry) => entry,
        }
    }

    pub fn was_fetched(&self) -> bool {
        matches!(self, CacheLookup::Fetched(_))
    }
}

/// On-disk cache shared by all fetches of a run (and by later runs)
#[derive(Debug)]
pub struct ContentCache {
    root: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Turns a revision into a single safe path component.
pub fn cache_key(revision: &str) -> String {
    let mut key = String::with_capacity(revision.len());
    for byte in revision.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("%{:02X}", byte));
        }
    }
    key
}

/// Inverse of [`cache_key`]; `None` for names the cache did not produce.
pub fn revision_from_key(key: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(key.len());
    let mut rest = key.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            bytes.push(byte);
            rest = tail;
        } else {
            return None;
        }
    }
    let revision = String::from_utf8(bytes).ok()?;
    (cache_key(&revision) == key).then_some(revision)
}

fn poisoned(context: &str) -> Error {
    Error::LockPoisoned {
        context: context.to_string(),
    }
}

impl ContentCache {
    /// Opens (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the copy of `revision` lives (whether or not it exists yet).
    pub fn copy_path(&self, revision: &str) -> PathBuf {
        self.root.join(cache_key(revision))
    }

    fn hash_path(&self, revision: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", cache_key(revision), HASH_SUFFIX))
    }

    /// Looks up `revision`, validating that its copy still exists.
    pub fn lookup(&self, revision: &str) -> Result<Option<CacheEntry>> {
        {
            let mut entries = self.entries.lock().map_err(|_| poisoned("cache entries"))?;
            if let Some(entry) = entries.get(revision) {
                if entry.local_copy.is_dir() {
                    return Ok(Some(entry.clone()));
                }
                entries.remove(revision);
            }
        }

        let hash_file = self.hash_path(revision);
        let content_hash = match fs::read_to_string(&hash_file) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let local_copy = self.copy_path(revision);
        if content_hash.is_empty() || !local_copy.is_dir() {
            warn!(
                "Cache entry for {} is incomplete, it will be fetched again",
                revision
            );
            remove_if_exists(&hash_file)?;
            return Ok(None);
        }

        let entry = CacheEntry {
            local_copy,
            content_hash,
        };
        self.entries
            .lock()
            .map_err(|_| poisoned("cache entries"))?
            .insert(revision.to_string(), entry.clone());
        Ok(Some(entry))
    }

    /// Records `entry` for `revision`.
    ///
    /// Storing the same hash again is a no-op; a different hash for a
    /// revision already present is a [`Error::CacheInconsistency`].
    pub fn store(&self, revision: &str, entry: CacheEntry) -> Result<()> {
        if let Some(existing) = self.lookup(revision)? {
            if existing.content_hash != entry.content_hash {
                return Err(Error::CacheInconsistency {
                    revision: revision.to_string(),
                    cached: existing.content_hash,
                    fetched: entry.content_hash,
                });
            }
            return Ok(());
        }

        let hash_file = self.hash_path(revision);
        let tmp = hash_file.with_extension("sha256.tmp");
        fs::write(&tmp, &entry.content_hash)?;
        fs::rename(&tmp, &hash_file)?;

        self.entries
            .lock()
            .map_err(|_| poisoned("cache entries"))?
            .insert(revision.to_string(), entry);
        Ok(())
    }

    fn key_lock(&self, revision: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.key_locks.lock().map_err(|_| poisoned("cache key locks"))?;
        Ok(Arc::clone(
            locks
                .entry(revision.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Returns the cached entry for `revision`, or runs `fetch` to create it.
    ///
    /// `fetch` receives the (empty) destination directory and must return
    /// the finished entry. Concurrent callers for the same revision are
    /// serialized, so `fetch` runs at most once per revision.
    pub fn get_or_fetch<F>(&self, revision: &str, fetch: F) -> Result<CacheLookup>
    where
        F: FnOnce(&Path) -> Result<CacheEntry>,
    {
        let lock = self.key_lock(revision)?;
        let _guard = lock.lock().map_err(|_| poisoned("cache key lock"))?;

        if let Some(entry) = self.lookup(revision)? {
            debug!("Cache hit for {}", revision);
            return Ok(CacheLookup::Hit(entry));
        }

        let destination = self.copy_path(revision);
        if destination.exists() {
            debug!(
                "Removing uncommitted copy {} before fetching",
                destination.display()
            );
            fs::remove_dir_all(&destination)?;
        }

        let entry = fetch(&destination)?;
        self.store(revision, entry.clone())?;
        Ok(CacheLookup::Fetched(entry))
    }

    /// Lists committed entries on disk as `(revision, entry)`, sorted by key.
    pub fn entries(&self) -> Result<Vec<(String, CacheEntry)>> {
        let mut found = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = name.strip_suffix(HASH_SUFFIX) else {
                continue;
            };
            let Some(revision) = revision_from_key(key) else {
                debug!("Ignoring foreign cache file {}", path.display());
                continue;
            };
            let local_copy = self.root.join(key);
            if !local_copy.is_dir() {
                continue;
            }
            let content_hash = fs::read_to_string(&path)?.trim().to_string();
            found.push((
                revision,
                CacheEntry {
                    local_copy,
                    content_hash,
                },
            ));
        }
        found.sort_by(|a, b| cache_key(&a.0).cmp(&cache_key(&b.0)));
        Ok(found)
    }

    /// Lists paths left behind by failed or pruned fetches: copy
    /// directories without a hash file, and hash files without a copy.
    pub fn stale_paths(&self) -> Result<Vec<PathBuf>> {
        let mut stale = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(key) = name.strip_suffix(HASH_SUFFIX) {
                if !self.root.join(key).is_dir() {
                    stale.push(path);
                }
            } else if path.is_dir() {
                if !self.root.join(format!("{}{}", name, HASH_SUFFIX)).is_file() {
                    stale.push(path);
                }
            } else if name.ends_with(".tmp") {
                stale.push(path);
            }
        }
        stale.sort();
        Ok(stale)
    }

    /// Deletes the entry for `revision` (hash file first, then the copy).
    pub fn remove(&self, revision: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| poisoned("cache entries"))?
            .remove(revision);
        remove_if_exists(&self.hash_path(revision))?;
        let copy = self.copy_path(revision);
        if copy.exists() {
            fs::remove_dir_all(copy)?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
