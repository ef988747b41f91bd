//! Debounced search.
//!
//! Keystrokes call [`Debouncer::call`]; only the last call inside the window
//! actually runs.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `task` once the window passes without another call.
    ///
    /// Supersedes (aborts) the previously scheduled task. Must be called from
    /// within a tokio runtime.
    pub fn call<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            task.await;
        });

        let previous = self.pending.lock().unwrap_or_else(PoisonError::into_inner).replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the scheduled task, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Seen = Arc<Mutex<Vec<&'static str>>>;

    fn search(seen: &Seen, query: &'static str) -> impl Future<Output = ()> + Send + 'static {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(query);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_call_in_the_window_runs() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let seen = Seen::default();

        debouncer.call(search(&seen, "c"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call(search(&seen, "ch"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call(search(&seen, "cha"));
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(301)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["cha"]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn calls_outside_the_window_all_run() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let seen = Seen::default();

        debouncer.call(search(&seen, "a"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        debouncer.call(search(&seen, "b"));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let seen = Seen::default();

        debouncer.call(search(&seen, "x"));
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(!debouncer.is_pending());
    }
}
