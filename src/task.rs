//! Cancelable background tasks running on a fixed period.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A spawned task calling a closure every `period`.
///
/// The task stops when [`cancel`](Self::cancel) is called or the handle is
/// dropped. Must be spawned from within a Tokio runtime.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` on the current runtime, first after one period.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_at(name, Instant::now() + period, period, tick)
    }

    /// Spawn `tick` on the current runtime, first right away.
    pub fn spawn_immediate<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_at(name, Instant::now(), period, tick)
    }

    fn spawn_at<F, Fut>(name: &'static str, start: Instant, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            // After a suspended process wakes up, tick once rather than in a burst.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracing::trace!("Periodic task {} tick", name);
                tick().await;
            }
        });

        tracing::debug!("Started periodic task {} every {:?}", name, period);
        Self { name, handle }
    }

    /// The task's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task. A tick already running is aborted at its next await.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            tracing::debug!("Cancelling periodic task {}", self.name);
        }
        self.handle.abort();
    }

    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);
        let task = PeriodicTask::spawn("test", Duration::from_secs(60), move || {
            let ticks = Arc::clone(&ticks_clone);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(155)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(task.name(), "test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_first_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);
        let _task = PeriodicTask::spawn_immediate("test", Duration::from_secs(60), move || {
            let ticks = Arc::clone(&ticks_clone);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);
        let task = PeriodicTask::spawn("test", Duration::from_secs(1), move || {
            let ticks = Arc::clone(&ticks_clone);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        task.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }
}
