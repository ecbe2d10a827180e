//! # Reap Mini Client
//!
//! Client core of a tap-to-earn rewards mini app.
//!
//! ## Features
//!
//! - Tap counter with a fixed quota per window, persisted across restarts
//! - Lazy and timer-driven window resets
//! - Callback and stream subscriptions to counter changes
//! - Lifetime score and share statistics
//! - Token balance and price lookups with local caching
//! - Telegram or peer DID identity with custodial wallet login
//! - Merchant deal recommendations from the synced deals store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reap_mini::store::{JsonFilePersister, MemoryStore};
//! use reap_mini::tap::TapRateLimiter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new("daily-stats"));
//!     let limiter = TapRateLimiter::new(store, JsonFilePersister::new("daily-stats.json"));
//!     limiter.load().await;
//!
//!     let count = limiter.increment().await?;
//!     println!("Taps this window: {}", count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod rewards;
pub mod session;
pub mod stats;
pub mod store;
pub mod tap;
pub mod task;

// Re-export commonly used types at crate root
pub use context::AppContext;
pub use error::ReapError;
pub use tap::{TapEvent, TapRateLimiter, TapState};

/// Result type alias using ReapError
pub type Result<T> = std::result::Result<T, ReapError>;
