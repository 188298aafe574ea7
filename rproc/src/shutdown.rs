//! Cooperative shutdown.
//!
//! A [`ShutdownToken`] is handed to every worker and polled before a file is
//! admitted and before each line. The [`ShutdownCoordinator`] owns the token
//! together with a count of admitted workers, so a shutdown can flip the token
//! and then wait, with a deadline, for that count to reach zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::errors::{ProcessError, ProcessResult};

/// Default time a shutdown waits for in-flight workers
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// One-way cancellation flag shared by all workers of a run
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the token. Returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        self.cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Counts admitted workers and wakes waiters when the count drops to zero
#[derive(Debug, Default)]
pub struct WorkerTracker {
    active: Mutex<usize>,
    idle: Condvar,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a worker unless the token is already cancelled.
    ///
    /// The check happens under the counter's lock, so a worker admitted here is
    /// always visible to a concurrent [`wait_idle`](Self::wait_idle).
    pub fn admit(&self, token: &ShutdownToken) -> Option<WorkerGuard<'_>> {
        let mut active = lock_or_recover(&self.active);
        if token.is_cancelled() {
            return None;
        }
        *active += 1;
        Some(WorkerGuard { tracker: self })
    }

    pub fn active(&self) -> usize {
        *lock_or_recover(&self.active)
    }

    /// Blocks until no worker is admitted or `deadline` elapses.
    /// Returns whether the tracker went idle.
    pub fn wait_idle(&self, deadline: Duration) -> bool {
        let guard = lock_or_recover(&self.active);
        let (guard, _) = match self
            .idle
            .wait_timeout_while(guard, deadline, |active| *active > 0)
        {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard == 0
    }

    fn release(&self) {
        let mut active = lock_or_recover(&self.active);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.idle.notify_all();
        }
    }
}

/// Admission slot held by a running worker; released exactly once on drop
#[derive(Debug)]
pub struct WorkerGuard<'a> {
    tracker: &'a WorkerTracker,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

/// Shutdown state of one processor
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: ShutdownToken,
    tracker: WorkerTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the token polled by workers
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn admit(&self) -> Option<WorkerGuard<'_>> {
        self.tracker.admit(&self.token)
    }

    pub fn active_workers(&self) -> usize {
        self.tracker.active()
    }

    /// Requests shutdown and waits up to `deadline` for admitted workers to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::ShutdownTimeout`] when workers are still running
    /// once the deadline has passed.
    pub fn shutdown(&self, deadline: Duration) -> ProcessResult<()> {
        if self.token.cancel() {
            info!(
                active = self.tracker.active(),
                deadline = ?deadline,
                "shutdown requested"
            );
        } else {
            debug!("shutdown already requested, waiting for workers");
        }

        if self.tracker.wait_idle(deadline) {
            info!("all workers stopped");
            Ok(())
        } else {
            error!(
                active = self.tracker.active(),
                deadline = ?deadline,
                "workers still running after shutdown deadline"
            );
            Err(ProcessError::ShutdownTimeout(deadline))
        }
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
