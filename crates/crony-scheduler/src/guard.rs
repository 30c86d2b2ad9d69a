use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Single-flight gate for one workload.
///
/// Clones share the same flag. A trigger that arrives while a run is in
/// flight is dropped, never queued.
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    name: Arc<str>,
    running: Arc<AtomicBool>,
}

impl ConcurrencyGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run `job` unless a previous run is still in flight.
    ///
    /// Returns `None` when the trigger was skipped. The flag is cleared when
    /// `job` completes, panics, or is dropped mid-flight.
    pub async fn run<F>(&self, job: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(workload = %self.name, "execution still in progress, skipping trigger");
            return None;
        }

        let _release = Release(&self.running);
        Some(job.await)
    }
}

struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
