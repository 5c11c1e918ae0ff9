//! Phase 2: Parallel fetching
//!
//! Each discovery pass hands this phase the distinct revisions it claimed.
//! They are fetched on the run's worker pool and the phase returns only when
//! every one has finished (the pass's join point). The [`ContentCache`]
//! serializes work per revision, so a revision is never fetched twice even
//! when concurrent runs share a cache root.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::cache::{CacheEntry, CacheLookup, ContentCache};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::fetcher::{FetchRequest, SourceFetcher};

/// One revision to make available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub url: String,
    pub revision: String,
}

/// Cache entries for one pass, keyed by revision
#[derive(Debug, Default)]
pub struct PassFetches {
    pub entries: HashMap<String, CacheEntry>,
    pub fetched: usize,
    pub cache_hits: usize,
}

/// Builds the worker pool for a run.
pub fn build_pool(jobs: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("deps-vendor-fetch-{}", i))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Executes Phase 2 for one pass.
///
/// All jobs run to completion even if one fails. The error reported is the
/// first failure in `jobs` order, so a failing run fails the same way every
/// time.
pub fn execute(
    jobs: &[FetchJob],
    fetcher: &dyn SourceFetcher,
    cache: &ContentCache,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<PassFetches> {
    let results: Vec<Result<CacheLookup>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| fetch_one(job, fetcher, cache, cancel))
            .collect()
    });

    let mut pass = PassFetches::default();
    for (job, result) in jobs.iter().zip(results) {
        let lookup = result?;
        if lookup.was_fetched() {
            pass.fetched += 1;
        } else {
            pass.cache_hits += 1;
        }
        pass.entries.insert(job.revision.clone(), lookup.into_entry());
    }
    Ok(pass)
}

fn fetch_one(
    job: &FetchJob,
    fetcher: &dyn SourceFetcher,
    cache: &ContentCache,
    cancel: &CancellationToken,
) -> Result<CacheLookup> {
    cancel.check()?;
    cache.get_or_fetch(&job.revision, |destination| {
        debug!("Fetching {}@{}", job.url, job.revision);
        let request = FetchRequest {
            url: job.url.clone(),
            revision: job.revision.clone(),
            destination: destination.to_path_buf(),
            recursive: true,
        };
        let fetched = fetcher.fetch(&request, cancel)?;
        Ok(CacheEntry {
            local_copy: fetched.local_copy,
            content_hash: fetched.content_hash,
        })
    })
}
