//! Throttler: evaluates named rules against externally persisted state.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::key::StorageKey;
use super::rule::RuleState;
use super::rules::RuleSet;
use super::store::StateStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ThrottleError};

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// The request is admitted
    Ok,
    /// The request is throttled
    OverLimit,
}

/// Status returned for each check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckStatus {
    pub code: Code,
    /// Key the state was persisted under
    pub key: StorageKey,
    /// State after the check was logged
    pub state: RuleState,
    /// Retention hint handed to the store
    pub ttl: Duration,
}

impl CheckStatus {
    /// Whether the request was throttled.
    pub fn is_throttled(&self) -> bool {
        self.code == Code::OverLimit
    }
}

/// Runs the load → restore → check → log → persist cycle for named rules.
///
/// The cycle for one storage key is serialized with a per-key async mutex,
/// so two concurrent checks for the same identity never both read the same
/// volume and both admit. Different keys proceed in parallel. This only
/// covers callers sharing this `Throttler`; a store shared between processes
/// needs its own compare-and-swap or locking.
pub struct Throttler<S: StateStore> {
    rules: RuleSet,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    /// In-flight evaluations, by storage key
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: StateStore> Throttler<S> {
    /// Create a throttler using the system clock.
    pub fn new(rules: RuleSet, store: Arc<S>) -> Self {
        Self::with_clock(rules, store, Arc::new(SystemClock))
    }

    /// Create a throttler reading time from `clock`.
    pub fn with_clock(rules: RuleSet, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            store,
            clock,
            locks: DashMap::new(),
        }
    }

    /// Check whether `identity` may proceed under the named rule.
    ///
    /// Admission mutates and persists the rule's state. The observation is
    /// logged on every check, admitted or not, since drain applied during a
    /// rejected check is kept in the persisted volume.
    pub async fn check(&self, rule_name: &str, identity: &str) -> Result<CheckStatus> {
        let definition = self
            .rules
            .get(rule_name)
            .ok_or_else(|| ThrottleError::UnknownRule(rule_name.to_string()))?;
        let mut rule = definition.build(self.clock.clone())?;
        let key = StorageKey::new(rule.key(), rule_name, identity);
        let store_key = key.to_string_key();

        let lock = self.lock_for(&store_key);
        let guard = lock.lock().await;

        let outcome = async {
            let now = self.clock.now();

            match self.store.load(&store_key).await? {
                Some(state) => rule.set_state(state),
                None => debug!(key = %key, "Creating new rule state"),
            }

            let throttled = rule.check_and_log(now);
            let state = rule.state();
            let ttl = rule.ttl();
            self.store.save(&store_key, state, ttl).await?;

            trace!(
                key = %key,
                throttled,
                volume = state.volume,
                ttl_ms = ttl.as_millis() as u64,
                "Checked rule"
            );

            Ok::<_, ThrottleError>((throttled, state, ttl))
        }
        .await;

        drop(guard);
        drop(lock);
        self.release_lock(&store_key);

        let (throttled, state, ttl) = outcome?;
        let code = if throttled {
            debug!(key = %key, "Request throttled");
            Code::OverLimit
        } else {
            Code::Ok
        };

        Ok(CheckStatus {
            code,
            key,
            state,
            ttl,
        })
    }

    /// Read the persisted state for `identity` under the named rule.
    ///
    /// Returns `None` if nothing is stored.
    pub async fn current_state(&self, rule_name: &str, identity: &str) -> Result<Option<RuleState>> {
        let key = self.storage_key(rule_name, identity)?;
        self.store.load(&key.to_string_key()).await
    }

    /// Forget the persisted state for `identity` under the named rule.
    pub async fn reset(&self, rule_name: &str, identity: &str) -> Result<()> {
        let key = self.storage_key(rule_name, identity)?;
        self.store.remove(&key.to_string_key()).await
    }

    fn storage_key(&self, rule_name: &str, identity: &str) -> Result<StorageKey> {
        let definition = self
            .rules
            .get(rule_name)
            .ok_or_else(|| ThrottleError::UnknownRule(rule_name.to_string()))?;
        let rule = definition.build(self.clock.clone())?;
        Ok(StorageKey::new(rule.key(), rule_name, identity))
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the key's lock once no other evaluation holds or awaits it.
    fn release_lock(&self, key: &str) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of keys with an evaluation in flight.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
