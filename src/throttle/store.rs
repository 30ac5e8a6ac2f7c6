//! State store trait for persisting rule state between evaluations.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::rule::RuleState;
use crate::error::Result;

/// Trait for rule state persistence.
///
/// Implementations only store and expire state; they do not serialize the
/// load/evaluate/save cycle. Callers that evaluate one key concurrently must
/// hold a per-key lock around the whole cycle (see `Throttler`).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the persisted state for a key, if present and not expired.
    async fn load(&self, key: &str) -> Result<Option<RuleState>>;

    /// Persist state for a key for `ttl`. A zero TTL removes the key.
    async fn save(&self, key: &str, state: RuleState, ttl: Duration) -> Result<()>;

    /// Forget a key.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// A stored, JSON-encoded state pair and its expiry.
#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process state store with lazy TTL expiry.
///
/// Values are kept in the same encoded form an external cache would hold.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: DashMap<String, Entry>,
    /// Lower bound applied to non-zero TTLs
    min_ttl: Duration,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that keeps every non-empty entry for at least `min_ttl`.
    pub fn with_min_ttl(min_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            min_ttl,
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<RuleState>> {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            trace!(key = %key, "Evicted expired state");
            return Ok(None);
        }

        match self.entries.get(key) {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.payload)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, state: RuleState, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }

        let ttl = ttl.max(self.min_ttl);
        let entry = Entry {
            payload: serde_json::to_string(&state)?,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrottleError;
    use chrono::{TimeZone, Utc};
    use tokio_test::assert_ok;

    fn state(volume: f64) -> RuleState {
        RuleState::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), volume)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStateStore::new();

        assert_ok!(store.save("leakyBucket:api:a", state(2.0), Duration::from_secs(60)).await);

        let loaded = store.load("leakyBucket:api:a").await.unwrap();
        assert_eq!(loaded, Some(state(2.0)));
        assert_eq!(store.load("leakyBucket:api:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_removes() {
        let store = InMemoryStateStore::new();

        assert_ok!(store.save("k", state(1.0), Duration::from_secs(60)).await);
        assert_ok!(store.save("k", state(0.0), Duration::ZERO).await);

        assert!(store.is_empty());
        assert_eq!(store.load("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_absent() {
        let store = InMemoryStateStore::new();

        assert_ok!(store.save("k", state(1.0), Duration::from_millis(20)).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.load("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_min_ttl_extends_short_entries() {
        let store = InMemoryStateStore::with_min_ttl(Duration::from_secs(60));

        assert_ok!(store.save("k", state(1.0), Duration::from_millis(1)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.purge_expired();

        assert_eq!(store.load("k").await.unwrap(), Some(state(1.0)));
    }

    #[tokio::test]
    async fn test_partial_payload_decodes_as_no_state() {
        let store = InMemoryStateStore::new();
        store.entries.insert(
            "k".to_string(),
            Entry {
                payload: "[]".to_string(),
                expires_at: None,
            },
        );

        let loaded = store.load("k").await.unwrap().unwrap();
        assert!(!loaded.is_restorable());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_a_codec_error() {
        let store = InMemoryStateStore::new();
        store.entries.insert(
            "k".to_string(),
            Entry {
                payload: "{not json".to_string(),
                expires_at: None,
            },
        );

        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, ThrottleError::Codec(_)));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryStateStore::new();

        assert_ok!(store.save("k", state(1.0), Duration::from_secs(60)).await);
        assert_ok!(store.remove("k").await);
        assert_eq!(store.len(), 0);
    }
}
