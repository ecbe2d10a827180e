//! The tap counter state machine, free of storage and timers.

use time::OffsetDateTime;

use crate::error::ReapError;

use super::TapLimits;

/// Whether taps are currently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapState {
    /// Count is below the quota
    Active,
    /// Quota exhausted until the window resets
    Limited,
}

impl std::fmt::Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TapState::Active => write!(f, "active"),
            TapState::Limited => write!(f, "limited"),
        }
    }
}

/// Taps accumulated in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapCounter {
    /// Taps in the current window
    pub count: u32,
    /// When the current window began
    pub window_start: OffsetDateTime,
}

impl TapCounter {
    /// A fresh counter whose window starts at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Current state against the given limits.
    pub fn state(&self, limits: &TapLimits) -> TapState {
        if self.is_limit_reached(limits) {
            TapState::Limited
        } else {
            TapState::Active
        }
    }

    /// Whether the quota is exhausted.
    pub fn is_limit_reached(&self, limits: &TapLimits) -> bool {
        self.count >= limits.max_taps
    }

    /// Whether the window that started at `window_start` is over at `now`.
    ///
    /// A window start in the future (clock moved backwards) never expires
    /// until the clock catches up.
    pub fn window_expired(&self, now: OffsetDateTime, limits: &TapLimits) -> bool {
        now - self.window_start >= limits.reset_interval
    }

    /// Time left until the window resets, zero if it already expired.
    ///
    /// A window ending past the representable date range never resets and
    /// reports [`Duration::MAX`](std::time::Duration::MAX).
    pub fn time_until_reset(&self, now: OffsetDateTime, limits: &TapLimits) -> std::time::Duration {
        match self.window_start.checked_add(limits.reset_interval) {
            Some(window_end) => (window_end - now).try_into().unwrap_or_default(),
            None => std::time::Duration::MAX,
        }
    }

    /// Count one tap, or reject it when limited.
    pub fn try_increment(&mut self, limits: &TapLimits) -> Result<u32, ReapError> {
        if self.is_limit_reached(limits) {
            return Err(ReapError::LimitReached {
                limit: limits.max_taps,
            });
        }
        self.count += 1;
        Ok(self.count)
    }

    /// Start a new empty window at `now`.
    pub fn reset(&mut self, now: OffsetDateTime) {
        self.count = 0;
        self.window_start = now;
    }
}
