//! Rate-limited tap counter.
//!
//! Taps are counted per window. Once the count reaches the quota every
//! further tap is rejected until the window is over, at which point the
//! counter resets to zero and a new window starts.
//!
//! The reset is lazy: the elapsed time is checked on load and by a
//! recurring timer, so a process that was not running across the window
//! boundary still resets on its next start.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reap_mini::store::{MemoryPersister, MemoryStore};
//! use reap_mini::tap::{TapEvent, TapLimits, TapRateLimiter, TapState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = TapRateLimiter::builder(
//!     Arc::new(MemoryStore::new("daily-stats")),
//!     MemoryPersister::new(),
//! )
//! .limits(TapLimits { max_taps: 2, ..TapLimits::default() })
//! .build();
//!
//! limiter.subscribe(|event| {
//!     if let TapEvent::LimitReached { count } = event {
//!         println!("limited at {count}");
//!     }
//! });
//!
//! limiter.load().await;
//! limiter.increment().await.unwrap();
//! limiter.increment().await.unwrap();
//! assert_eq!(limiter.state(), TapState::Limited);
//! assert!(limiter.increment().await.unwrap_err().is_limit_reached());
//! # }
//! ```

mod clock;
mod counter;
mod limiter;
mod observer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{TapCounter, TapState};
pub use limiter::{TapRateLimiter, TapRateLimiterBuilder, TapSnapshot, cells};
pub use observer::{Observers, SubscriptionId, TapEvent};

use std::time::Duration;

/// Maximum taps accepted within one window.
pub const DAILY_TAP_LIMIT: u32 = 9000;

/// Length of a window in minutes.
pub const RESET_INTERVAL_MINUTES: i64 = 60;

/// How often the reset timer checks for an expired window.
pub const RESET_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Quota and window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapLimits {
    /// Taps accepted per window.
    pub max_taps: u32,
    /// Window length.
    pub reset_interval: time::Duration,
}

impl Default for TapLimits {
    fn default() -> Self {
        Self {
            max_taps: DAILY_TAP_LIMIT,
            reset_interval: time::Duration::minutes(RESET_INTERVAL_MINUTES),
        }
    }
}
