//! Storage key generation for persisted rule state.

/// A key that uniquely identifies persisted rule state.
///
/// Composed of the strategy's key, the configured rule name and the
/// throttled identity, so two strategies (or two rules) applied to the
/// same identity never share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    /// Strategy identifier from `Rule::key`
    pub strategy: &'static str,
    /// Configured rule name
    pub rule: String,
    /// The throttled identity (client id, API key, IP, ...)
    pub identity: String,
}

impl StorageKey {
    /// Create a new storage key.
    pub fn new(strategy: &'static str, rule: &str, identity: &str) -> Self {
        Self {
            strategy,
            rule: rule.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Convert the key to the string used by the state store.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}:{}", self.strategy, self.rule, self.identity)
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_to_string() {
        let key = StorageKey::new("leakyBucket", "api", "client-a");
        assert_eq!(key.to_string_key(), "leakyBucket:api:client-a");
        assert_eq!(key.to_string(), "leakyBucket:api:client-a");
    }

    #[test]
    fn test_strategies_do_not_collide() {
        let leaky = StorageKey::new("leakyBucket", "api", "10.0.0.1");
        let fixed = StorageKey::new("fixedWindow", "api", "10.0.0.1");

        assert_ne!(leaky, fixed);
        assert_ne!(leaky.to_string_key(), fixed.to_string_key());
    }

    #[test]
    fn test_storage_key_equality() {
        let key1 = StorageKey::new("leakyBucket", "api", "client-a");
        let key2 = StorageKey::new("leakyBucket", "api", "client-a");

        assert_eq!(key1, key2);
    }
}
