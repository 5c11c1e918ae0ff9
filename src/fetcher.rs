//! # Source Fetching
//!
//! The resolver never talks to the network itself. It asks a
//! [`SourceFetcher`] to place a pinned revision into a directory chosen by
//! the [`ContentCache`](crate::cache::ContentCache) and to report the
//! content hash of the result.
//!
//! - [`NixPrefetchGit`](crate::git::NixPrefetchGit) is the default
//!   implementation, backed by `nix-prefetch-git` and `nix hash-path`.
//! - [`RetryingFetcher`] wraps any fetcher with bounded retries and
//!   exponential backoff.
//!
//! Tests substitute scripted fetchers through the same trait.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::cancel::CancellationToken;
use crate::error::Result;

/// What to fetch and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub revision: String,
    /// Directory to create; it does not exist when `fetch` is called
    pub destination: PathBuf,
    /// Fetch submodules as well
    pub recursive: bool,
}

/// A finished fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub local_copy: PathBuf,
    pub content_hash: String,
}

/// Fetches a pinned revision and measures its content hash.
///
/// Implementations must be idempotent: fetching the same `(url, revision)`
/// twice yields the same hash.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedSource>;
}

/// Retry schedule for [`RetryingFetcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Retries transport failures of an inner fetcher.
///
/// Only [`Error::FetchFailure`](crate::error::Error::FetchFailure) is
/// retried. Cancellation is observed between attempts and during backoff.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: SourceFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<F: SourceFetcher> SourceFetcher for RetryingFetcher<F> {
    fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedSource> {
        let mut attempt = 1;
        loop {
            cancel.check()?;
            match self.inner.fetch(request, cancel) {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && attempt < self.policy.attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "Fetch of {}@{} failed (attempt {}/{}), retrying in {:?}: {}",
                        request.url, request.revision, attempt, self.policy.attempts, delay, e
                    );
                    if request.destination.exists() {
                        fs::remove_dir_all(&request.destination)?;
                    }
                    cancel.sleep(delay)?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
