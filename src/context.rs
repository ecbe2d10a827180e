//! Wiring of the stores, the tap limiter and the rewards services.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::Stream;
use rust_decimal::Decimal;

use crate::config::{AppConfig, stores};
use crate::error::ReapError;
use crate::gateway::{DealActivation, RewardsGateway, TokenBalance};
use crate::rewards::{BalanceTracker, Deal, DealCatalog, PriceCache, total_balance_usd};
use crate::session::{Identity, Session, WalletService, store_peer_did};
use crate::stats::ActivityStats;
use crate::store::{JsonFilePersister, MemoryStore, Persister};
use crate::tap::{Clock, SubscriptionId, SystemClock, TapEvent, TapRateLimiter, TapSnapshot};
use crate::task::PeriodicTask;

/// The running application: every store loaded, the tap reset and price
/// refresh timers spawned.
///
/// # Example
///
/// ```no_run
/// use reap_mini::config::AppConfig;
/// use reap_mini::context::AppContext;
///
/// # async fn run() -> reap_mini::Result<()> {
/// let config = AppConfig::from_env()?;
/// let gateway = config.rewards_client();
/// let app = AppContext::start(config, gateway).await?;
///
/// match app.tap().await {
///     Ok(count) => println!("{} taps this window", count),
///     Err(e) if e.is_limit_reached() => println!("come back later"),
///     Err(e) => return Err(e),
/// }
///
/// app.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct AppContext<G> {
    config: AppConfig,
    gateway: Arc<G>,
    limiter: Arc<TapRateLimiter<JsonFilePersister>>,
    stats: ActivityStats<JsonFilePersister>,
    balance: Arc<BalanceTracker<G, JsonFilePersister>>,
    price: Arc<PriceCache<G, JsonFilePersister>>,
    deals: DealCatalog<JsonFilePersister>,
    identity_store: Arc<MemoryStore>,
    identity_persister: JsonFilePersister,
    tasks: Mutex<Vec<PeriodicTask>>,
    balance_task: Mutex<Option<PeriodicTask>>,
}

impl<G> AppContext<G>
where
    G: RewardsGateway + 'static,
{
    /// Open and load every store under the configured data directory, then
    /// spawn the tap reset and price refresh timers.
    pub async fn start(config: AppConfig, gateway: G) -> Result<Self, ReapError> {
        Self::start_with_clock(config, gateway, Arc::new(SystemClock)).await
    }

    /// [`start`](Self::start) with a custom clock.
    pub async fn start_with_clock(
        config: AppConfig,
        gateway: G,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ReapError> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let dir = config.data_dir.as_path();
        let open = |name: &str| (Arc::new(MemoryStore::new(name)), JsonFilePersister::in_dir(dir, name));

        let gateway = Arc::new(gateway);

        let (store, persister) = open(stores::DAILY_STATS);
        let limiter = Arc::new(
            TapRateLimiter::builder(store, persister)
                .clock(Arc::clone(&clock))
                .limits(config.tap_limits)
                .build(),
        );

        let (score_store, score_persister) = open(stores::CLICK_STATS);
        let (share_store, share_persister) = open(stores::SHARE_STATS);
        let stats = ActivityStats::new(score_store, score_persister, share_store, share_persister);

        let (store, persister) = open(stores::TOKEN_BALANCE);
        let balance = Arc::new(BalanceTracker::new(Arc::clone(&gateway), store, persister));

        let (store, persister) = open(stores::TOKEN_PRICE);
        let price = Arc::new(
            PriceCache::new(Arc::clone(&gateway), store, persister)
                .with_ttl(config.price_ttl)
                .with_clock(clock),
        );

        let (store, persister) = open(stores::DEALS);
        let deals = DealCatalog::new(store, persister);

        let (identity_store, identity_persister) = open(stores::PEER_DID);

        let snapshot = limiter.load().await;
        let (score, shares) = stats.load().await;
        balance.load().await;
        price.load().await;
        deals.load().await;
        if let Err(e) = identity_persister.load(&identity_store).await {
            tracing::warn!("Failed to load peer DID: {}", e);
        }
        tracing::info!(
            "App started: {} taps this window ({:?}), score {}, shares {}",
            snapshot.count,
            snapshot.state,
            score,
            shares
        );

        let reset_timer = limiter.spawn_reset_timer(config.reset_poll_interval);
        let price_timer = price.spawn_refresh(config.price_ttl);

        Ok(Self {
            config,
            gateway,
            limiter,
            stats,
            balance,
            price,
            deals,
            identity_store,
            identity_persister,
            tasks: Mutex::new(vec![reset_timer, price_timer]),
            balance_task: Mutex::new(None),
        })
    }

    /// Count a tap: the window counter first, then the lifetime score.
    ///
    /// A rejected tap leaves the score untouched.
    pub async fn tap(&self) -> Result<u32, ReapError> {
        let count = self.limiter.increment().await?;
        self.stats.record_tap().await;
        Ok(count)
    }

    /// Count a share of the invite link.
    pub async fn record_share(&self) -> u64 {
        self.stats.record_share().await
    }

    /// Register a callback for tap counter changes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TapEvent) + Send + Sync + 'static,
    {
        self.limiter.subscribe(callback)
    }

    /// Remove a tap callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.limiter.unsubscribe(id)
    }

    /// Stream of tap events published from now on.
    pub fn events(&self) -> impl Stream<Item = TapEvent> + Send + 'static {
        self.limiter.events()
    }

    /// Current tap window state.
    pub fn tap_snapshot(&self) -> TapSnapshot {
        self.limiter.snapshot()
    }

    /// The tap limiter.
    pub fn limiter(&self) -> &Arc<TapRateLimiter<JsonFilePersister>> {
        &self.limiter
    }

    /// Lifetime tap score and share count.
    pub fn stats(&self) -> &ActivityStats<JsonFilePersister> {
        &self.stats
    }

    /// The rewards gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// The configuration the context was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Resolve the user from Telegram init data or the stored peer DID.
    pub fn identity(&self, init_data: Option<&str>) -> Result<Identity, ReapError> {
        Identity::resolve(init_data, &self.identity_store)
    }

    /// Store a peer DID as this device's identity.
    pub async fn save_peer_did(&self, did: &str) -> Result<(), ReapError> {
        store_peer_did(&self.identity_store, did);
        self.identity_persister.save(&self.identity_store).await
    }

    /// Log the user in and start tracking their wallet balance.
    pub async fn login<W: WalletService>(
        &self,
        wallets: &W,
        init_data: Option<&str>,
    ) -> Result<Session, ReapError> {
        let identity = self.identity(init_data)?;
        let session = Session::login(wallets, self.gateway.as_ref(), identity).await?;
        self.start_balance_refresh(session.address());
        Ok(session)
    }

    /// Fetch the balance of `address` now and then every configured interval.
    ///
    /// Replaces the refresh of a previously logged in address.
    pub fn start_balance_refresh(&self, address: &str) {
        let mut slot = self.lock_balance_task();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(
            self.balance
                .spawn_refresh(address, self.config.balance_refresh_interval),
        );
        tracing::debug!("Started balance refresh for {}", address);
    }

    /// Stop refreshing the balance. Returns `false` if no refresh was running.
    pub fn stop_balance_refresh(&self) -> bool {
        match self.lock_balance_task().take() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Fetch the balance of `address` now.
    pub async fn refresh_balance(&self, address: &str) -> Result<TokenBalance, ReapError> {
        self.balance.refresh(address).await
    }

    /// Total token balance last stored.
    pub fn balance(&self) -> Decimal {
        self.balance.stored_total()
    }

    /// Token price in USD, from the store while fresh.
    pub async fn current_price(&self) -> Decimal {
        self.price.current_price().await
    }

    /// Value of the stored balance at the current price, in USD.
    pub async fn balance_usd(&self) -> Decimal {
        let price = self.current_price().await;
        total_balance_usd(self.balance(), price)
    }

    /// The first `n` synced merchant deals, reloaded from disk.
    pub async fn recommendations(&self, n: usize) -> Vec<Deal> {
        self.deals.recommendations(n).await
    }

    /// Activate a deal for a user and get the merchant redirect.
    pub async fn activate_deal(&self, user_id: &str, deal: &Deal) -> Result<DealActivation, ReapError> {
        self.gateway.activate_deal(user_id, &deal.deal_id).await
    }

    /// Cancel background tasks, flush the tap counter and release every store.
    pub async fn shutdown(self) {
        self.stop_balance_refresh();
        for task in self.lock_tasks().drain(..) {
            tracing::debug!("Cancelling {} task", task.name());
            task.cancel();
        }

        if let Err(e) = self.limiter.flush().await {
            tracing::warn!("Failed to flush tap counter: {}", e);
        }

        self.limiter.destroy().await;
        self.stats.destroy().await;
        self.balance.destroy().await;
        self.price.destroy().await;
        self.deals.destroy().await;
        self.identity_persister.destroy().await;
        tracing::info!("App shut down");
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<PeriodicTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_balance_task(&self) -> MutexGuard<'_, Option<PeriodicTask>> {
        self.balance_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<G> std::fmt::Debug for AppContext<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("data_dir", &self.config.data_dir)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
