use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cancellable scheduled tasks keyed by id
///
/// Replaces ad-hoc timers for reservation expiry and booking reminders:
/// every timer is owned by an id (reservation token, booking id) and can be
/// revoked explicitly, so no timer outlives the thing it belongs to.
/// Scheduling the same id again replaces the previous timer.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, unless cancelled first
    pub fn schedule<F>(&self, id: impl Into<String>, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let registry = Arc::clone(&self.tasks);
        let key = id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            registry.lock().expect("timer registry poisoned").remove(&key);
        });

        let mut tasks = self.tasks.lock().expect("timer registry poisoned");
        if let Some(previous) = tasks.insert(id, handle) {
            previous.abort();
        }
    }

    /// Revoke a pending task; returns whether one was pending
    pub fn cancel(&self, id: &str) -> bool {
        let handle = self.tasks.lock().expect("timer registry poisoned").remove(id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every pending task
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().expect("timer registry poisoned");
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().expect("timer registry poisoned").len()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_task_fires_after_delay() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler.schedule("t1", Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_revokes_pending_task() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler.schedule("t1", Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(scheduler.cancel("t1"));
        assert!(!scheduler.cancel("t1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous_timer() {
        let scheduler = TaskScheduler::new();
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&count);
            scheduler.schedule("same-id", Duration::from_secs(5), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
