//! Periodic task runner for client-side polling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs a task every `interval`, on demand through [`Schedule::run_now`],
/// and stops when dropped.
///
/// Runs never overlap. Demand requests made while a run is in progress
/// collapse into a single follow-up run, and every run restarts the
/// interval.
pub struct Schedule {
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Schedule {
    pub fn spawn<F, Fut>(interval: Duration, run_on_start: bool, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wake = Arc::new(Notify::new());
        let notified = wake.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !run_on_start {
                // The first tick completes immediately.
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = notified.notified() => {}
                }
                task().await;
                ticker.reset();
            }
        });

        Self { wake, handle }
    }

    /// Requests a run as soon as the current one (if any) finishes.
    pub fn run_now(&self) {
        self.wake.notify_one();
    }

    pub fn cancel(self) {}

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
