//! The admission rule contract shared by every throttling strategy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// A throttling strategy evaluated against externally persisted state.
///
/// A rule is built fresh for every evaluation, restored with [`Rule::set_state`],
/// checked, logged, and then persisted again through [`Rule::state`]. Nothing
/// drains in the background: elapsed time is computed lazily at check time
/// against the last logged observation.
///
/// # Ordering
///
/// [`Rule::throttled`] must run before [`Rule::log`] in every evaluation
/// cycle, and `log` must run exactly once per cycle. The check reads the
/// previous observation time; logging first would zero the elapsed time,
/// and skipping the log would re-apply the same elapsed interval on the
/// next check. [`Rule::check_and_log`] performs both steps in order.
///
/// Rules hold no locks. Callers that evaluate the same storage key from
/// several tasks must serialize the load/check/store cycle themselves.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Whether the current request should be denied, using the rule's clock.
    ///
    /// Admits the request (mutating internal state) when it returns `false`.
    fn throttled(&mut self) -> bool;

    /// Same as [`Rule::throttled`] with an explicit evaluation time.
    fn throttled_at(&mut self, now: Timestamp) -> bool;

    /// Record `timestamp` as the basis for the next elapsed-time computation.
    fn log(&mut self, timestamp: Timestamp) -> &mut dyn Rule;

    /// Strategy identifier, used as the leading part of storage keys.
    fn key(&self) -> &'static str;

    /// Minimal state needed to reconstruct equivalent behavior later.
    fn state(&self) -> RuleState;

    /// Restore previously persisted state into a freshly built rule.
    ///
    /// A state without an observation time is ignored.
    fn set_state(&mut self, state: RuleState);

    /// How long persisted state is worth keeping.
    fn ttl(&self) -> Duration;

    /// Check at `now`, then log `now`. Returns whether the request was throttled.
    fn check_and_log(&mut self, now: Timestamp) -> bool {
        let throttled = self.throttled_at(now);
        self.log(now);
        throttled
    }
}

/// Persisted rule state: the last observation time and the current volume.
///
/// Serializes as the ordered pair `[observed_at, volume]`. Missing trailing
/// elements and nulls decode to the defaults, so `[]` and `[null]` both read
/// as "no prior state".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StatePair", into = "StatePair")]
pub struct RuleState {
    /// Time of the last logged observation
    pub observed_at: Option<Timestamp>,
    /// Fill level (leaky bucket) or admitted count (fixed window)
    pub volume: f64,
}

impl RuleState {
    /// Create a state pair.
    pub fn new(observed_at: Timestamp, volume: f64) -> Self {
        Self {
            observed_at: Some(observed_at),
            volume,
        }
    }

    /// Whether this state carries anything to restore.
    pub fn is_restorable(&self) -> bool {
        self.observed_at.is_some()
    }
}

#[derive(Serialize, Deserialize)]
struct StatePair(
    #[serde(default)] Option<Timestamp>,
    #[serde(default)] Option<f64>,
);

impl From<StatePair> for RuleState {
    fn from(pair: StatePair) -> Self {
        Self {
            observed_at: pair.0,
            volume: pair.1.unwrap_or_default(),
        }
    }
}

impl From<RuleState> for StatePair {
    fn from(state: RuleState) -> Self {
        StatePair(state.observed_at, Some(state.volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_state_serializes_as_pair() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let state = RuleState::new(at, 2.5);

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"["2024-05-01T12:00:00Z",2.5]"#);

        let decoded: RuleState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_partial_pairs_decode_to_defaults() {
        let empty: RuleState = serde_json::from_str("[]").unwrap();
        assert_eq!(empty, RuleState::default());
        assert!(!empty.is_restorable());

        let null_first: RuleState = serde_json::from_str("[null]").unwrap();
        assert!(!null_first.is_restorable());

        let only_time: RuleState = serde_json::from_str(r#"["2024-05-01T12:00:00Z"]"#).unwrap();
        assert!(only_time.is_restorable());
        assert_eq!(only_time.volume, 0.0);
    }

    #[test]
    fn test_pair_with_null_volume() {
        let state: RuleState = serde_json::from_str(r#"["2024-05-01T12:00:00Z", null]"#).unwrap();
        assert_eq!(state.volume, 0.0);
    }
}
