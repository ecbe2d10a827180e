//! Token price with a persisted, time-bounded cache.

use std::sync::Arc;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::gateway::RewardsGateway;
use crate::store::{MemoryStore, Persister};
use crate::tap::{Clock, SystemClock};
use crate::task::PeriodicTask;

/// Store addressing of the cached price.
pub mod cells {
    /// Table holding prices.
    pub const TABLE: &str = "price";
    /// Row of the reward token.
    pub const ROW: &str = "APRIL";
    /// USD price as text with 6 decimal places.
    pub const USD: &str = "usd";
    /// Epoch milliseconds of the last successful fetch.
    pub const LAST_FETCH_TIME: &str = "lastFetchTime";
}

/// How long a fetched price is served from the store.
pub const DEFAULT_PRICE_TTL: std::time::Duration = std::time::Duration::from_secs(2 * 60 * 60);

/// Serves the token price from the store while it is fresh and refetches
/// it otherwise. A failed fetch falls back to the stored price, then to the
/// default price.
pub struct PriceCache<G, P> {
    gateway: Arc<G>,
    store: Arc<MemoryStore>,
    persister: P,
    clock: Arc<dyn Clock>,
    ttl: std::time::Duration,
    default_price: Decimal,
}

impl<G, P> PriceCache<G, P>
where
    G: RewardsGateway,
    P: Persister,
{
    /// Create a cache with the system clock, a 2 hour TTL and a zero default.
    pub fn new(gateway: Arc<G>, store: Arc<MemoryStore>, persister: P) -> Self {
        Self {
            gateway,
            store,
            persister,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_PRICE_TTL,
            default_price: Decimal::ZERO,
        }
    }

    /// Set how long a fetched price stays fresh.
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the price used when nothing was ever fetched.
    pub fn with_default_price(mut self, price: Decimal) -> Self {
        self.default_price = price;
        self
    }

    /// Load the persisted price. Failures are logged.
    pub async fn load(&self) {
        if let Err(e) = self.persister.load(&self.store).await {
            tracing::warn!("Failed to load cached price: {}", e);
        }
    }

    /// The stored price if it is younger than the TTL, otherwise a fresh one.
    pub async fn current_price(&self) -> Decimal {
        if let Some((price, fetched_at)) = self.stored() {
            if self.clock.now() - fetched_at < self.ttl {
                tracing::debug!("Token price {} served from store", price);
                return price;
            }
        }
        self.refresh().await
    }

    /// Fetch the price now, falling back to the stored or default price.
    pub async fn refresh(&self) -> Decimal {
        match self.gateway.get_token_price().await {
            Ok(price) => {
                let fetched_at = self.clock.now();
                let millis = (fetched_at.unix_timestamp_nanos() / 1_000_000) as i64;
                self.store
                    .set_cell(cells::TABLE, cells::ROW, cells::USD, format!("{:.6}", price));
                self.store
                    .set_cell(cells::TABLE, cells::ROW, cells::LAST_FETCH_TIME, millis);
                if let Err(e) = self.persister.save(&self.store).await {
                    tracing::warn!("Failed to persist token price: {}", e);
                }
                tracing::info!("Token price updated to {}", price);
                price
            }
            Err(e) => {
                tracing::warn!("Failed to fetch token price: {}", e);
                match self.stored_price() {
                    Some(price) => {
                        tracing::info!("Using stored token price {}", price);
                        price
                    }
                    None => {
                        tracing::info!("Using default token price {}", self.default_price);
                        self.default_price
                    }
                }
            }
        }
    }

    /// Spawn a task running [`current_price`](Self::current_price) every
    /// `period`, first after one period.
    pub fn spawn_refresh(self: &Arc<Self>, period: std::time::Duration) -> PeriodicTask
    where
        G: 'static,
        P: 'static,
    {
        let cache = Arc::clone(self);
        PeriodicTask::spawn("price-refresh", period, move || {
            let cache = Arc::clone(&cache);
            async move {
                cache.current_price().await;
            }
        })
    }

    /// The last stored price regardless of age.
    pub fn stored_price(&self) -> Option<Decimal> {
        self.store
            .get_cell(cells::TABLE, cells::ROW, cells::USD)
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
    }

    fn stored(&self) -> Option<(Decimal, OffsetDateTime)> {
        let price = self.stored_price()?;
        let millis = self
            .store
            .get_cell(cells::TABLE, cells::ROW, cells::LAST_FETCH_TIME)?
            .as_i64()?;
        let fetched_at =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()?;
        Some((price, fetched_at))
    }

    /// Release the backing store.
    pub async fn destroy(&self) {
        self.persister.destroy().await;
    }
}

/// USD value of a token balance. Zero when no price is known.
pub fn total_balance_usd(balance: Decimal, price: Decimal) -> Decimal {
    if price.is_zero() {
        return Decimal::ZERO;
    }
    balance * price
}

/// Format a USD amount as `$1,234.57`.
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((&text, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}${grouped}.{fraction}")
}
