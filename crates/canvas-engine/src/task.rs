//! Cancellable background work
//!
//! Long running jobs (flood fill, index builds) run on the rayon pool and
//! hand their result back through a oneshot channel. Cancellation is
//! cooperative: the job polls its [`CancelToken`] between units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled from the start.
    pub fn cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle to a job started with [`spawn`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    cancel: CancelToken,
    rx: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Ask the job to stop. It still delivers a (cancelled) result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The result, if the job has finished.
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Block until the job finishes. `None` if the job panicked.
    pub fn wait(self) -> Option<T> {
        self.rx.blocking_recv().ok()
    }
}

/// Run `job` on the rayon pool.
pub fn spawn<T, F>(cancel: CancelToken, job: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let token = cancel.clone();
    rayon::spawn(move || {
        // The receiver may already be gone
        let _ = tx.send(job(&token));
    });
    TaskHandle { cancel, rx }
}
