//! Application configuration.
//!
//! Every setting has a default; [`AppConfig::from_env`] overrides them from
//! `REAP_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ReapError;
use crate::gateway::RewardsClient;
use crate::gateway::endpoints::{PRIMARY_BASE_URL, REGIONAL_BASE_URL};
use crate::rewards::{BALANCE_REFRESH_INTERVAL, DEFAULT_PRICE_TTL};
use crate::tap::{RESET_POLL_INTERVAL, TapLimits};

/// Environment variable names.
pub mod vars {
    /// Directory holding the persisted stores.
    pub const DATA_DIR: &str = "REAP_DATA_DIR";
    /// Base URL of the balance and price functions.
    pub const PRIMARY_URL: &str = "REAP_PRIMARY_URL";
    /// Base URL of the reward and deal functions.
    pub const REGIONAL_URL: &str = "REAP_REGIONAL_URL";
    /// Seconds between tap window checks.
    pub const RESET_POLL_SECS: &str = "REAP_RESET_POLL_SECS";
    /// Seconds between balance refreshes.
    pub const BALANCE_REFRESH_SECS: &str = "REAP_BALANCE_REFRESH_SECS";
    /// Seconds a fetched price stays fresh.
    pub const PRICE_TTL_SECS: &str = "REAP_PRICE_TTL_SECS";
}

/// Store names, used as file names under the data directory.
pub mod stores {
    /// Tap window counter.
    pub const DAILY_STATS: &str = "daily-stats";
    /// Lifetime tap score.
    pub const CLICK_STATS: &str = "click-stats";
    /// Lifetime share count.
    pub const SHARE_STATS: &str = "share-stats";
    /// Cached token balance.
    pub const TOKEN_BALANCE: &str = "token-balance";
    /// Cached token price.
    pub const TOKEN_PRICE: &str = "token-price";
    /// Device peer DID.
    pub const PEER_DID: &str = "peer-did";
    /// Merchant deals written by the sync layer.
    pub const DEALS: &str = "kindred-deals";
}

/// Configuration for the application context.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the persisted stores.
    pub data_dir: PathBuf,
    /// Base URL of the balance and price functions.
    pub primary_url: String,
    /// Base URL of the reward and deal functions.
    pub regional_url: String,
    /// Tap quota and window length.
    pub tap_limits: TapLimits,
    /// How often the tap window is checked for expiry.
    pub reset_poll_interval: Duration,
    /// How often the wallet balance is refetched.
    pub balance_refresh_interval: Duration,
    /// How long a fetched price is served from the store.
    pub price_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".reap-mini"),
            primary_url: PRIMARY_BASE_URL.to_string(),
            regional_url: REGIONAL_BASE_URL.to_string(),
            tap_limits: TapLimits::default(),
            reset_poll_interval: RESET_POLL_INTERVAL,
            balance_refresh_interval: BALANCE_REFRESH_INTERVAL,
            price_ttl: DEFAULT_PRICE_TTL,
        }
    }
}

impl AppConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::new()
    }

    /// Load the configuration from `REAP_*` environment variables.
    ///
    /// Unset variables keep their defaults; a set but unparsable variable is
    /// an [`ReapError::InvalidConfig`] error.
    pub fn from_env() -> Result<Self, ReapError> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: try_load(vars::DATA_DIR)?.unwrap_or(defaults.data_dir),
            primary_url: try_load::<Url>(vars::PRIMARY_URL)?
                .map(String::from)
                .unwrap_or(defaults.primary_url),
            regional_url: try_load::<Url>(vars::REGIONAL_URL)?
                .map(String::from)
                .unwrap_or(defaults.regional_url),
            tap_limits: defaults.tap_limits,
            reset_poll_interval: try_load(vars::RESET_POLL_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.reset_poll_interval),
            balance_refresh_interval: try_load(vars::BALANCE_REFRESH_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.balance_refresh_interval),
            price_ttl: try_load(vars::PRICE_TTL_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.price_ttl),
        })
    }

    /// HTTP gateway pointed at the configured base URLs.
    pub fn rewards_client(&self) -> RewardsClient {
        RewardsClient::builder()
            .primary_url(self.primary_url.as_str())
            .regional_url(self.regional_url.as_str())
            .build()
    }
}

fn try_load<T>(key: &str) -> Result<Option<T>, ReapError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ReapError::InvalidConfig(format!("{key}={value:?}: {e}"))),
        Err(_) => {
            tracing::info!("{} not set, using default", key);
            Ok(None)
        }
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Set the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Point both base URLs at one server (useful for testing).
    pub fn base_url(mut self, url: &str) -> Result<Self, ReapError> {
        Url::parse(url)?;
        self.config.primary_url = url.to_string();
        self.config.regional_url = url.to_string();
        Ok(self)
    }

    /// Set the tap quota and window length.
    pub fn tap_limits(mut self, limits: TapLimits) -> Self {
        self.config.tap_limits = limits;
        self
    }

    /// Set the tap window poll interval.
    pub fn reset_poll_interval(mut self, interval: Duration) -> Self {
        self.config.reset_poll_interval = interval;
        self
    }

    /// Set the balance refresh interval.
    pub fn balance_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.balance_refresh_interval = interval;
        self
    }

    /// Set the price TTL.
    pub fn price_ttl(mut self, ttl: Duration) -> Self {
        self.config.price_ttl = ttl;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tap_limits.max_taps, 9000);
        assert_eq!(config.reset_poll_interval, Duration::from_secs(60));
        assert_eq!(config.price_ttl, Duration::from_secs(7200));
        assert_eq!(config.primary_url, PRIMARY_BASE_URL);
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::builder()
            .data_dir("/tmp/reap")
            .base_url("http://127.0.0.1:8080")
            .unwrap()
            .reset_poll_interval(Duration::from_secs(5))
            .build();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/reap"));
        assert_eq!(config.regional_url, "http://127.0.0.1:8080");
        assert_eq!(config.reset_poll_interval, Duration::from_secs(5));
        assert!(AppConfig::builder().base_url("not a url").is_err());
    }

    #[test]
    fn test_rewards_client_urls() {
        let config = AppConfig::builder()
            .base_url("http://127.0.0.1:8080/")
            .unwrap()
            .build();
        let client = config.rewards_client();

        assert_eq!(client.primary_url(), "http://127.0.0.1:8080");
        assert_eq!(client.regional_url(), "http://127.0.0.1:8080");
    }

    // Only variables no other test sets, to stay safe under parallel tests.
    #[test]
    fn test_from_env_rejects_garbage() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { env::set_var(vars::PRICE_TTL_SECS, "two hours") };
        let err = AppConfig::from_env().unwrap_err();
        unsafe { env::remove_var(vars::PRICE_TTL_SECS) };

        assert!(matches!(err, ReapError::InvalidConfig(_)));
    }
}
