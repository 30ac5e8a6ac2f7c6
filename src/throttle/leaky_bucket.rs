//! Leaky bucket admission rule.
//!
//! Every admitted request adds one drop to the bucket; the bucket drains at a
//! fixed rate per second. Drain is computed lazily at check time from the time
//! elapsed since the last logged observation, so the bucket can be persisted
//! between requests and restored without any background task.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::rule::{Rule, RuleState};
use crate::clock::{seconds_between, Clock, SystemClock, Timestamp};
use crate::error::{Result, ThrottleError};

/// Storage key prefix for leaky bucket state.
pub const LEAKY_BUCKET_KEY: &str = "leakyBucket";

/// A leaky bucket for one throttled identity.
///
/// A bucket that has never been logged is *unobserved*: its first check sees
/// zero elapsed time and drains nothing.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    /// Maximum fill level
    capacity: f64,
    /// Units drained per second
    drain_rate: f64,
    /// Current fill level, never negative
    volume: f64,
    /// Time of the last logged observation
    last_observed_at: Option<Timestamp>,
    clock: Arc<dyn Clock>,
}

impl LeakyBucket {
    /// Create an empty bucket using the system clock.
    pub fn new(capacity: f64, drain_rate: f64) -> Result<Self> {
        Self::with_clock(capacity, drain_rate, Arc::new(SystemClock))
    }

    /// Create an empty bucket reading time from `clock`.
    ///
    /// A fractional capacity admits as many drops as its ceiling.
    pub fn with_clock(capacity: f64, drain_rate: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(ThrottleError::Config(format!(
                "leaky bucket size must be a positive number, got {}",
                capacity
            )));
        }
        if !drain_rate.is_finite() || drain_rate <= 0.0 {
            return Err(ThrottleError::Config(format!(
                "leaky bucket drain rate must be a positive number, got {}",
                drain_rate
            )));
        }

        Ok(Self {
            capacity,
            drain_rate,
            volume: 0.0,
            last_observed_at: None,
            clock,
        })
    }

    /// Maximum fill level.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Units drained per second.
    pub fn drain_rate(&self) -> f64 {
        self.drain_rate
    }

    /// Current fill level.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Time of the last logged observation, if any.
    pub fn last_observed_at(&self) -> Option<Timestamp> {
        self.last_observed_at
    }

    /// Add `amount` to the volume. Non-positive and non-finite amounts are ignored.
    fn fill(&mut self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            self.volume += amount;
        }
    }

    /// Drain for the time elapsed since the last observation.
    fn drain(&mut self, now: Timestamp) {
        let Some(last) = self.last_observed_at else {
            return;
        };

        let elapsed = seconds_between(last, now);
        if elapsed > 0.0 {
            self.volume = (self.volume - elapsed * self.drain_rate).max(0.0);
        }
    }

    /// Drain, then test for room. Rounds the volume up so a partially
    /// drained drop still counts against the caller.
    fn has_capacity(&mut self, now: Timestamp) -> bool {
        self.drain(now);
        self.volume.ceil() < self.capacity
    }
}

impl Rule for LeakyBucket {
    fn throttled(&mut self) -> bool {
        let now = self.clock.now();
        self.throttled_at(now)
    }

    fn throttled_at(&mut self, now: Timestamp) -> bool {
        let admitted = self.has_capacity(now);
        if admitted {
            self.fill(1.0);
        }

        trace!(
            volume = self.volume,
            capacity = self.capacity,
            admitted,
            "Leaky bucket checked"
        );

        !admitted
    }

    fn log(&mut self, timestamp: Timestamp) -> &mut dyn Rule {
        self.last_observed_at = Some(timestamp);
        self
    }

    fn key(&self) -> &'static str {
        LEAKY_BUCKET_KEY
    }

    fn state(&self) -> RuleState {
        RuleState {
            observed_at: self.last_observed_at,
            volume: self.volume,
        }
    }

    fn set_state(&mut self, state: RuleState) {
        let Some(observed_at) = state.observed_at else {
            return;
        };
        self.last_observed_at = Some(observed_at);
        self.fill(state.volume);
    }

    /// Time until the bucket is fully drained, saturating at `Duration::MAX`.
    fn ttl(&self) -> Duration {
        let secs = self.volume / self.drain_rate;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
