//! Persistent, observable tap rate limiter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::Stream;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ReapError;
use crate::store::{MemoryStore, Persister};
use crate::task::PeriodicTask;

use super::clock::{Clock, SystemClock};
use super::counter::{TapCounter, TapState};
use super::observer::{Observers, SubscriptionId, TapEvent};
use super::{RESET_POLL_INTERVAL, TapLimits};

/// Store addressing of the persisted counter.
pub mod cells {
    /// Table holding the window counter.
    pub const TABLE: &str = "dailyStats";
    /// Row holding the window counter.
    pub const ROW: &str = "clicks";
    /// Taps in the current window.
    pub const COUNT: &str = "count";
    /// RFC 3339 start of the current window.
    pub const LAST_RESET: &str = "lastReset";
}

/// Point-in-time view of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSnapshot {
    /// Taps in the current window
    pub count: u32,
    /// When the current window began
    pub window_start: OffsetDateTime,
    /// Whether taps are accepted
    pub state: TapState,
    /// Taps left before the limiter becomes limited
    pub remaining: u32,
}

/// Gates taps behind a per-window quota and keeps the counter persisted.
///
/// The window is reset lazily: on [`load`](Self::load), and whenever
/// [`check_and_reset`](Self::check_and_reset) runs, usually from the timer
/// returned by [`spawn_reset_timer`](Self::spawn_reset_timer).
///
/// State changes are published to observers right after the in-memory
/// mutation and before the store write completes. Store writes are serialized,
/// and each one writes the latest in-memory counter.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use reap_mini::store::{MemoryPersister, MemoryStore};
/// use reap_mini::tap::TapRateLimiter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), reap_mini::ReapError> {
/// let store = Arc::new(MemoryStore::new("daily-stats"));
/// let limiter = TapRateLimiter::builder(store, MemoryPersister::new()).build();
///
/// limiter.load().await;
/// assert_eq!(limiter.increment().await?, 1);
/// # Ok(())
/// # }
/// ```
pub struct TapRateLimiter<P> {
    store: Arc<MemoryStore>,
    persister: P,
    clock: Arc<dyn Clock>,
    limits: TapLimits,
    counter: Mutex<TapCounter>,
    persist_lock: tokio::sync::Mutex<()>,
    observers: Observers<TapEvent>,
}

impl<P: Persister> TapRateLimiter<P> {
    /// Create a limiter with the system clock and default limits.
    pub fn new(store: Arc<MemoryStore>, persister: P) -> Self {
        Self::builder(store, persister).build()
    }

    /// Create a limiter builder.
    pub fn builder(store: Arc<MemoryStore>, persister: P) -> TapRateLimiterBuilder<P> {
        TapRateLimiterBuilder::new(store, persister)
    }

    fn lock_counter(&self) -> MutexGuard<'_, TapCounter> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the persisted counter, resetting it if its window is over.
    ///
    /// Never fails: an unreadable backing store is logged and the counter
    /// falls back to whatever the store holds, or to a fresh window.
    pub async fn load(&self) -> TapSnapshot {
        if let Err(e) = self.persister.load(&self.store).await {
            tracing::warn!("Failed to load tap counter, using defaults: {}", e);
        }

        let now = self.clock.now();
        let (loaded, complete) = self.read_cells(now);
        *self.lock_counter() = loaded;
        tracing::debug!("Loaded tap counter: {} taps since {}", loaded.count, loaded.window_start);

        let reset = self.check_and_reset().await;
        if !reset {
            if loaded.is_limit_reached(&self.limits) {
                self.observers.notify(&TapEvent::LimitReached {
                    count: loaded.count,
                });
            }
            if !complete {
                self.persist().await;
            }
        }

        self.snapshot()
    }

    /// Count one tap.
    ///
    /// Returns the new count, or [`ReapError::LimitReached`] without touching
    /// the counter when the quota is exhausted. Storage failures are logged
    /// and never returned.
    pub async fn increment(&self) -> Result<u32, ReapError> {
        let count = self.lock_counter().try_increment(&self.limits)?;

        self.observers.notify(&TapEvent::CountChanged { count });
        if count >= self.limits.max_taps {
            tracing::info!("Tap limit of {} reached", self.limits.max_taps);
            self.observers.notify(&TapEvent::LimitReached { count });
        }

        self.persist().await;
        Ok(count)
    }

    /// Reset the counter if its window is over.
    ///
    /// Returns `true` if a reset happened. Calling it again right after a
    /// reset is a no-op.
    pub async fn check_and_reset(&self) -> bool {
        let now = self.clock.now();
        let previous = {
            let mut counter = self.lock_counter();
            if !counter.window_expired(now, &self.limits) {
                return false;
            }
            let previous = counter.count;
            counter.reset(now);
            previous
        };

        tracing::info!("Tap window expired, resetting counter from {}", previous);
        self.observers.notify(&TapEvent::CountChanged { count: 0 });
        self.persist().await;
        true
    }

    /// Spawn a task running [`check_and_reset`](Self::check_and_reset) every
    /// `period`. Dropping or cancelling the returned task stops it.
    pub fn spawn_reset_timer(self: &Arc<Self>, period: std::time::Duration) -> PeriodicTask
    where
        P: 'static,
    {
        let limiter = Arc::clone(self);
        PeriodicTask::spawn("tap-reset", period, move || {
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.check_and_reset().await;
            }
        })
    }

    /// Spawn the reset timer at the default one minute granularity.
    pub fn spawn_default_reset_timer(self: &Arc<Self>) -> PeriodicTask
    where
        P: 'static,
    {
        self.spawn_reset_timer(RESET_POLL_INTERVAL)
    }

    /// Current state of the limiter.
    pub fn snapshot(&self) -> TapSnapshot {
        let counter = *self.lock_counter();
        TapSnapshot {
            count: counter.count,
            window_start: counter.window_start,
            state: counter.state(&self.limits),
            remaining: self.limits.max_taps.saturating_sub(counter.count),
        }
    }

    /// Taps in the current window.
    pub fn count(&self) -> u32 {
        self.lock_counter().count
    }

    /// Whether taps are currently accepted.
    pub fn state(&self) -> TapState {
        self.lock_counter().state(&self.limits)
    }

    /// Whether the quota is exhausted.
    pub fn is_limit_reached(&self) -> bool {
        self.lock_counter().is_limit_reached(&self.limits)
    }

    /// Time until the current window resets.
    pub fn time_until_reset(&self) -> std::time::Duration {
        self.lock_counter()
            .time_until_reset(self.clock.now(), &self.limits)
    }

    /// The limits in force.
    pub fn limits(&self) -> &TapLimits {
        &self.limits
    }

    /// The store the counter is written to.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Register a callback for count-changed and limit-reached events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TapEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Remove a callback registered with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Stream of events published from now on.
    pub fn events(&self) -> impl Stream<Item = TapEvent> + Send + 'static {
        self.observers.stream()
    }

    /// Write the counter and wait for the backing store.
    pub async fn flush(&self) -> Result<(), ReapError> {
        let _guard = self.persist_lock.lock().await;
        self.write_cells();
        self.persister.save(&self.store).await
    }

    /// Release the backing store. Later persists are logged as failures.
    pub async fn destroy(&self) {
        let _guard = self.persist_lock.lock().await;
        self.persister.destroy().await;
    }

    /// Serialized write of the latest counter. Failures are logged.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        self.write_cells();
        if let Err(e) = self.persister.save(&self.store).await {
            tracing::warn!("Failed to persist tap counter: {}", e);
        }
    }

    fn write_cells(&self) {
        let counter = *self.lock_counter();
        let window_start = counter
            .window_start
            .format(&Rfc3339)
            .unwrap_or_else(|_| counter.window_start.unix_timestamp().to_string());
        self.store
            .set_cell(cells::TABLE, cells::ROW, cells::COUNT, counter.count);
        self.store
            .set_cell(cells::TABLE, cells::ROW, cells::LAST_RESET, window_start);
    }

    /// Read the counter from the store. The flag is `false` when a cell was
    /// missing or unreadable and a default was used.
    fn read_cells(&self, now: OffsetDateTime) -> (TapCounter, bool) {
        let count = self
            .store
            .get_cell(cells::TABLE, cells::ROW, cells::COUNT)
            .and_then(|v| v.as_u32());
        let window_start = self
            .store
            .get_cell(cells::TABLE, cells::ROW, cells::LAST_RESET)
            .and_then(|v| v.as_str().and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok()));

        let complete = count.is_some() && window_start.is_some();
        let counter = TapCounter {
            count: count.unwrap_or(0),
            window_start: window_start.unwrap_or(now),
        };
        (counter, complete)
    }
}

impl<P> std::fmt::Debug for TapRateLimiter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counter = *self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TapRateLimiter")
            .field("store", &self.store.name())
            .field("limits", &self.limits)
            .field("counter", &counter)
            .finish()
    }
}

/// Builder for [`TapRateLimiter`].
pub struct TapRateLimiterBuilder<P> {
    store: Arc<MemoryStore>,
    persister: P,
    clock: Option<Arc<dyn Clock>>,
    limits: TapLimits,
}

impl<P: Persister> TapRateLimiterBuilder<P> {
    /// Create a new builder with default settings.
    pub fn new(store: Arc<MemoryStore>, persister: P) -> Self {
        Self {
            store,
            persister,
            clock: None,
            limits: TapLimits::default(),
        }
    }

    /// Set the clock (useful for testing with a manual clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the quota and window length.
    pub fn limits(mut self, limits: TapLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the limiter. The counter starts as a fresh window until
    /// [`TapRateLimiter::load`] runs.
    pub fn build(self) -> TapRateLimiter<P> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let counter = TapCounter::new(clock.now());

        TapRateLimiter {
            store: self.store,
            persister: self.persister,
            clock,
            limits: self.limits,
            counter: Mutex::new(counter),
            persist_lock: tokio::sync::Mutex::new(()),
            observers: Observers::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CellValue, MemoryPersister};
    use crate::tap::ManualClock;
    use time::macros::datetime;

    fn limiter_at(
        start: OffsetDateTime,
        max_taps: u32,
    ) -> (TapRateLimiter<Arc<MemoryPersister>>, Arc<ManualClock>, Arc<MemoryPersister>) {
        let clock = Arc::new(ManualClock::new(start));
        let persister = Arc::new(MemoryPersister::new());
        let limiter = TapRateLimiter::builder(
            Arc::new(MemoryStore::new("daily-stats")),
            Arc::clone(&persister),
        )
        .clock(clock.clone())
        .limits(TapLimits {
            max_taps,
            reset_interval: time::Duration::minutes(60),
        })
        .build();
        (limiter, clock, persister)
    }

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let (limiter, _, persister) = limiter_at(datetime!(2024-05-01 10:00 UTC), 9000);

        let snapshot = limiter.load().await;
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.window_start, datetime!(2024-05-01 10:00 UTC));
        assert_eq!(snapshot.state, TapState::Active);
        assert_eq!(snapshot.remaining, 9000);

        let saved = persister.snapshot().unwrap();
        let row = &saved[cells::TABLE][cells::ROW];
        assert_eq!(row[cells::COUNT], CellValue::Integer(0));
        assert_eq!(row[cells::LAST_RESET].as_str(), Some("2024-05-01T10:00:00Z"));
    }

    #[tokio::test]
    async fn test_increment_notifies_before_persist() {
        let (limiter, _, persister) = limiter_at(datetime!(2024-05-01 10:00 UTC), 2);
        let limiter = Arc::new(limiter);
        limiter.load().await;
        let saves_after_load = persister.save_count();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (seen_clone, persister_clone) = (Arc::clone(&seen), Arc::clone(&persister));
        limiter.subscribe(move |event| {
            seen_clone
                .lock()
                .unwrap()
                .push((*event, persister_clone.save_count()));
        });

        assert_eq!(limiter.increment().await.unwrap(), 1);
        assert_eq!(limiter.increment().await.unwrap(), 2);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (TapEvent::CountChanged { count: 1 }, saves_after_load),
                (TapEvent::CountChanged { count: 2 }, saves_after_load + 1),
                (TapEvent::LimitReached { count: 2 }, saves_after_load + 1),
            ]
        );
        assert_eq!(persister.save_count(), saves_after_load + 2);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_increment() {
        let (limiter, _, persister) = limiter_at(datetime!(2024-05-01 10:00 UTC), 9000);
        persister.set_failing(true);

        let snapshot = limiter.load().await;
        assert_eq!(snapshot.count, 0);

        assert_eq!(limiter.increment().await.unwrap(), 1);
        assert_eq!(limiter.increment().await.unwrap(), 2);
        assert_eq!(limiter.count(), 2);
        assert_eq!(persister.save_count(), 0);
        assert!(limiter.flush().await.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_reset_is_noop_inside_window() {
        let (limiter, clock, _) = limiter_at(datetime!(2024-05-01 10:00 UTC), 9000);
        limiter.load().await;
        limiter.increment().await.unwrap();

        let notified = Arc::new(Mutex::new(0));
        let notified_clone = Arc::clone(&notified);
        limiter.subscribe(move |_| *notified_clone.lock().unwrap() += 1);

        clock.advance(time::Duration::minutes(59));
        assert!(!limiter.check_and_reset().await);
        assert_eq!(limiter.count(), 1);
        assert_eq!(*notified.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_time_until_reset() {
        let (limiter, clock, _) = limiter_at(datetime!(2024-05-01 10:00 UTC), 9000);
        limiter.load().await;

        clock.advance(time::Duration::minutes(20));
        assert_eq!(limiter.time_until_reset(), std::time::Duration::from_secs(40 * 60));
    }
}
