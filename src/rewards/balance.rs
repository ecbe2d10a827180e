//! Wallet token balance, refreshed periodically and kept in the store.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ReapError;
use crate::gateway::{RewardsGateway, TokenBalance};
use crate::store::{CellValue, MemoryStore, Persister, Row};
use crate::task::PeriodicTask;

/// Store addressing of the cached balance.
pub mod cells {
    /// Table holding balances.
    pub const TABLE: &str = "balance";
    /// Row of the reward token.
    pub const ROW: &str = "april";
    /// Total over all chains.
    pub const VALUE: &str = "value";
    /// Total with 18 decimal places.
    pub const DISPLAY_VALUE: &str = "displayValue";
    /// Celo share with 18 decimal places.
    pub const CELO: &str = "celo";
    /// Polygon share with 18 decimal places.
    pub const POLYGON: &str = "polygon";
}

/// How often the balance is refetched while a wallet is connected.
pub const BALANCE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Tracks the token balance of one wallet.
///
/// The last fetched balance is kept in the store, so a failed refresh leaves
/// the previous value in place.
pub struct BalanceTracker<G, P> {
    gateway: Arc<G>,
    store: Arc<MemoryStore>,
    persister: P,
}

impl<G, P> BalanceTracker<G, P>
where
    G: RewardsGateway + 'static,
    P: Persister + 'static,
{
    /// Create a tracker.
    pub fn new(gateway: Arc<G>, store: Arc<MemoryStore>, persister: P) -> Self {
        Self {
            gateway,
            store,
            persister,
        }
    }

    /// Load the persisted balance. Failures are logged.
    pub async fn load(&self) -> Option<TokenBalance> {
        if let Err(e) = self.persister.load(&self.store).await {
            tracing::warn!("Failed to load cached balance: {}", e);
        }
        self.stored()
    }

    /// Fetch the balance of `address` and store it.
    ///
    /// On failure the stored balance is left untouched and the error returned.
    pub async fn refresh(&self, address: &str) -> Result<TokenBalance, ReapError> {
        let balance = match self.gateway.get_token_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Failed to fetch token balance for {}: {}", address, e);
                return Err(e);
            }
        };

        let total = balance.total();
        let row: Row = [
            (cells::DISPLAY_VALUE, format!("{:.18}", total)),
            (cells::CELO, format!("{:.18}", balance.celo)),
            (cells::POLYGON, format!("{:.18}", balance.polygon)),
            (cells::VALUE, total.normalize().to_string()),
        ]
        .into_iter()
        .map(|(cell, value)| (cell.to_string(), CellValue::from(value)))
        .collect();
        self.store.set_row(cells::TABLE, cells::ROW, row);
        if let Err(e) = self.persister.save(&self.store).await {
            tracing::warn!("Failed to persist token balance: {}", e);
        }

        tracing::debug!("Total token balance: {}", total);
        Ok(balance)
    }

    /// The last stored balance.
    pub fn stored(&self) -> Option<TokenBalance> {
        let read = |cell| {
            self.store
                .get_cell(cells::TABLE, cells::ROW, cell)
                .and_then(|v| v.as_str().and_then(|s| Decimal::from_str(s).ok()))
        };
        Some(TokenBalance {
            celo: read(cells::CELO)?,
            polygon: read(cells::POLYGON)?,
        })
    }

    /// Total of the last stored balance, zero if none.
    pub fn stored_total(&self) -> Decimal {
        self.stored().map(|b| b.total()).unwrap_or_default()
    }

    /// Spawn a task refreshing the balance of `address` now and then every
    /// `period`. Cancelling the task also aborts a fetch in flight.
    pub fn spawn_refresh(self: &Arc<Self>, address: impl Into<String>, period: Duration) -> PeriodicTask {
        let tracker = Arc::clone(self);
        let address: Arc<str> = Arc::from(address.into());
        PeriodicTask::spawn_immediate("balance-refresh", period, move || {
            let tracker = Arc::clone(&tracker);
            let address = Arc::clone(&address);
            async move {
                // Errors are already logged and the stored value kept.
                let _ = tracker.refresh(&address).await;
            }
        })
    }

    /// Release the backing store.
    pub async fn destroy(&self) {
        self.persister.destroy().await;
    }
}
