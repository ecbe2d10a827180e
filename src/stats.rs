//! Lifetime tap score and share count.

use std::sync::Arc;

use crate::store::{MemoryStore, Persister};

/// Store addressing of the lifetime counters.
pub mod cells {
    /// Table holding both counters, each in its own store.
    pub const TABLE: &str = "stats";
    /// Row of the tap score.
    pub const CLICKS: &str = "clicks";
    /// Row of the share count.
    pub const SHARES: &str = "shares";
    /// Counter cell.
    pub const COUNT: &str = "count";
}

/// A never-resetting counter persisted in its own store.
pub struct LifetimeCounter<P> {
    store: Arc<MemoryStore>,
    persister: P,
    row: &'static str,
    write_lock: tokio::sync::Mutex<()>,
}

impl<P: Persister> LifetimeCounter<P> {
    /// Create a counter stored at `stats/<row>/count`.
    pub fn new(store: Arc<MemoryStore>, persister: P, row: &'static str) -> Self {
        Self {
            store,
            persister,
            row,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted value, zero if absent. Failures are logged.
    pub async fn load(&self) -> u64 {
        if let Err(e) = self.persister.load(&self.store).await {
            tracing::warn!("Failed to load {} count: {}", self.row, e);
        }
        let value = self.get();
        tracing::debug!("Loaded {} count: {}", self.row, value);
        value
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.store
            .get_cell(cells::TABLE, self.row, cells::COUNT)
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0)
    }

    /// Add one and persist. Returns the new value.
    pub async fn increment(&self) -> u64 {
        let _guard = self.write_lock.lock().await;
        let value = self.get() + 1;
        self.store.set_cell(
            cells::TABLE,
            self.row,
            cells::COUNT,
            i64::try_from(value).unwrap_or(i64::MAX),
        );
        if let Err(e) = self.persister.save(&self.store).await {
            tracing::warn!("Failed to persist {} count: {}", self.row, e);
        }
        value
    }

    /// The store holding the counter.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Release the backing store.
    pub async fn destroy(&self) {
        self.persister.destroy().await;
    }
}

/// Tap score and share count of the user.
pub struct ActivityStats<P> {
    score: LifetimeCounter<P>,
    shares: LifetimeCounter<P>,
}

impl<P: Persister> ActivityStats<P> {
    /// Create stats from one store and persister per counter.
    pub fn new(
        score_store: Arc<MemoryStore>,
        score_persister: P,
        share_store: Arc<MemoryStore>,
        share_persister: P,
    ) -> Self {
        Self {
            score: LifetimeCounter::new(score_store, score_persister, cells::CLICKS),
            shares: LifetimeCounter::new(share_store, share_persister, cells::SHARES),
        }
    }

    /// Load both counters.
    pub async fn load(&self) -> (u64, u64) {
        (self.score.load().await, self.shares.load().await)
    }

    /// Count an accepted tap.
    pub async fn record_tap(&self) -> u64 {
        self.score.increment().await
    }

    /// Count a share of the invite link.
    pub async fn record_share(&self) -> u64 {
        let shares = self.shares.increment().await;
        tracing::info!("Share recorded, {} total", shares);
        shares
    }

    /// Lifetime tap score.
    pub fn score(&self) -> u64 {
        self.score.get()
    }

    /// Lifetime share count.
    pub fn shares(&self) -> u64 {
        self.shares.get()
    }

    /// Release both backing stores.
    pub async fn destroy(&self) {
        self.score.destroy().await;
        self.shares.destroy().await;
    }
}
