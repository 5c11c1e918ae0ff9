//! Cooperative cancellation for resolution runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag. The resolver checks it at every pass
/// boundary and the fetchers check it while waiting on subprocesses.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that cancels itself once `timeout` has elapsed.
    ///
    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking early with `Error::Cancelled`.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let end = Instant::now().checked_add(duration);
        loop {
            self.check()?;
            let now = Instant::now();
            let slice = match end {
                Some(end) if now >= end => return Ok(()),
                Some(end) => SLEEP_SLICE.min(end - now),
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}
