//! Token price and balance kept fresh from the reward endpoints, and the
//! locally synced merchant deals.

pub mod balance;
pub mod deals;
pub mod price;

pub use balance::{BALANCE_REFRESH_INTERVAL, BalanceTracker};
pub use deals::{Deal, DealCatalog, RECOMMENDATION_COUNT};
pub use price::{DEFAULT_PRICE_TTL, PriceCache, format_usd, total_balance_usd};
