//! Admission rules and the machinery that persists their state.

mod fixed_window;
mod key;
mod leaky_bucket;
mod limiter;
mod rule;
mod rules;
mod store;

pub use fixed_window::{FixedWindow, TimeWindow, FIXED_WINDOW_KEY};
pub use key::StorageKey;
pub use leaky_bucket::{LeakyBucket, LEAKY_BUCKET_KEY};
pub use limiter::{CheckStatus, Code, Throttler};
pub use rule::{Rule, RuleState};
pub use rules::{RuleDefinition, RuleSet};
pub use store::{InMemoryStateStore, StateStore};
