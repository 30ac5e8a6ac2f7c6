//! Fixed window admission rule.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::rule::{Rule, RuleState};
use crate::clock::{seconds_between, Clock, SystemClock, Timestamp};
use crate::error::{Result, ThrottleError};

/// Storage key prefix for fixed window state.
pub const FIXED_WINDOW_KEY: &str = "fixedWindow";

/// Time window for fixed window counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }
}

/// Counts admitted requests in a window that opens at the first logged
/// observation and closes `window` later.
///
/// Persists as the pair `(window start, admitted count)`.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    /// Requests allowed per window
    limit: u32,
    window: TimeWindow,
    /// Admitted requests in the open window
    count: f64,
    /// When the open window started
    window_start: Option<Timestamp>,
    clock: Arc<dyn Clock>,
}

impl FixedWindow {
    /// Create a counter with no open window, using the system clock.
    pub fn new(limit: u32, window: TimeWindow) -> Result<Self> {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    /// Create a counter reading time from `clock`.
    pub fn with_clock(limit: u32, window: TimeWindow, clock: Arc<dyn Clock>) -> Result<Self> {
        if limit == 0 {
            return Err(ThrottleError::Config(
                "fixed window limit must be positive".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            count: 0.0,
            window_start: None,
            clock,
        })
    }

    /// Get the limit for this counter.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Get the time window for this counter.
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Admitted requests in the open window.
    pub fn current_count(&self) -> u32 {
        self.count as u32
    }

    /// Get the remaining quota.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current_count())
    }

    /// Close the window if it has expired.
    fn maybe_reset_window(&mut self, now: Timestamp) {
        let Some(start) = self.window_start else {
            return;
        };

        if seconds_between(start, now) >= self.window.duration().as_secs_f64() {
            self.count = 0.0;
            self.window_start = None;
        }
    }
}

impl Rule for FixedWindow {
    fn throttled(&mut self) -> bool {
        let now = self.clock.now();
        self.throttled_at(now)
    }

    fn throttled_at(&mut self, now: Timestamp) -> bool {
        self.maybe_reset_window(now);

        let admitted = self.count < f64::from(self.limit);
        if admitted {
            self.count += 1.0;
        }

        trace!(
            count = self.count,
            limit = self.limit,
            window = ?self.window,
            admitted,
            "Fixed window checked"
        );

        !admitted
    }

    fn log(&mut self, timestamp: Timestamp) -> &mut dyn Rule {
        if self.window_start.is_none() {
            self.window_start = Some(timestamp);
        }
        self
    }

    fn key(&self) -> &'static str {
        FIXED_WINDOW_KEY
    }

    fn state(&self) -> RuleState {
        RuleState {
            observed_at: self.window_start,
            volume: self.count,
        }
    }

    fn set_state(&mut self, state: RuleState) {
        let Some(start) = state.observed_at else {
            return;
        };
        self.window_start = Some(start);
        if state.volume.is_finite() && state.volume > 0.0 {
            self.count += state.volume.floor();
        }
    }

    /// Time left in the open window, or zero when nothing has been counted.
    fn ttl(&self) -> Duration {
        let Some(start) = self.window_start else {
            return Duration::ZERO;
        };
        if self.count <= 0.0 {
            return Duration::ZERO;
        }

        let elapsed = seconds_between(start, self.clock.now()).max(0.0);
        let left = self.window.duration().as_secs_f64() - elapsed;
        if left <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(left)
    }
}
