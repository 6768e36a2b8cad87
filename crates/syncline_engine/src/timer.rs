//! Cancellable one-shot timer.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A one-shot timer backed by a tokio task.
///
/// Scheduling replaces any pending run. Dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct Timer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Creates an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` after `delay`, cancelling any pending run.
    ///
    /// Returns false without scheduling when called outside a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });

        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Cancels the pending run, if any. Returns true if one was cancelled.
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Returns true if a run is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let make = move || {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let timer = Timer::new();
        let (count, make) = counter();

        assert!(timer.schedule(Duration::from_millis(100), make()));
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_replaces_pending_run() {
        let timer = Timer::new();
        let (count, make) = counter();

        timer.schedule(Duration::from_millis(100), make());
        tokio::time::sleep(Duration::from_millis(80)).await;
        timer.schedule(Duration::from_millis(100), make());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let timer = Timer::new();
        let (count, make) = counter();

        timer.schedule(Duration::from_millis(100), make());
        assert!(timer.cancel());
        assert!(!timer.is_pending());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_runtime_does_not_schedule() {
        let timer = Timer::new();
        assert!(!timer.schedule(Duration::from_millis(1), || {}));
        assert!(!timer.is_pending());
    }
}
