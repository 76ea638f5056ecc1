//! Caller-supplied execution resources.
//!
//! The runtime owns no threads and no reactor. Pools and timers are opaque
//! trait objects passed explicitly to `fork`/`race`/`seq`/`both`/`sleep`;
//! constructing and shutting them down is the caller's responsibility, and
//! there is deliberately no ambient global registry.

use std::sync::Arc;
use std::time::Duration;

/// A unit of work handed to a pool or timer.
pub type Job = Box<dyn FnOnce() + Send>;

/// Cancels a scheduled timer when invoked.
pub type CancelTimer = Box<dyn FnOnce() + Send>;

/// A thread pool: runs jobs somewhere else, eventually.
pub trait Executor: Send + Sync {
    /// Submit a job. The pool chooses the thread; the runtime only assumes
    /// the job runs at most once.
    fn execute(&self, job: Job);
}

/// A timer source for [`crate::sleep`].
pub trait Scheduler: Send + Sync {
    /// Run `job` once `after` has elapsed. The returned handle cancels the
    /// timer; cancelling after the job ran is a no-op.
    fn schedule(&self, after: Duration, job: Job) -> CancelTimer;
}

/// Pool and timer adapter over a tokio runtime handle.
///
/// `execute` uses the blocking pool, since jobs are synchronous interpreter
/// resumptions that may block; `schedule` spawns a sleeping task and cancels
/// by aborting it.
#[derive(Clone)]
pub struct TokioPool {
    handle: tokio::runtime::Handle,
}

impl TokioPool {
    /// Adapt an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Adapt the runtime of the current async context.
    ///
    /// # Panics
    /// Panics outside a tokio runtime, like [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Executor for TokioPool {
    fn execute(&self, job: Job) {
        self.handle.spawn_blocking(job);
    }
}

impl Scheduler for TokioPool {
    fn schedule(&self, after: Duration, job: Job) -> CancelTimer {
        tracing::trace!(?after, "scheduling timer");
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            job();
        });
        Box::new(move || {
            tracing::trace!("cancelling timer");
            task.abort();
        })
    }
}

/// Convenience: a `TokioPool` as a shareable executor.
pub fn pool(handle: tokio::runtime::Handle) -> Arc<dyn Executor> {
    Arc::new(TokioPool::new(handle))
}

/// Convenience: a `TokioPool` as a shareable scheduler.
pub fn scheduler(handle: tokio::runtime::Handle) -> Arc<dyn Scheduler> {
    Arc::new(TokioPool::new(handle))
}
