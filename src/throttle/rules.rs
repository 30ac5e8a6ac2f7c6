//! Named rule definitions and strategy selection.
//!
//! Rules are declared by name in YAML; each names a strategy and its
//! parameters. A definition builds a fresh, empty rule instance per
//! evaluation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::fixed_window::{FixedWindow, TimeWindow};
use super::leaky_bucket::LeakyBucket;
use super::rule::Rule;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ThrottleError};

/// A set of named rule definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Map of rule name to its definition
    #[serde(default)]
    pub rules: HashMap<String, RuleDefinition>,
}

/// A throttling strategy and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RuleDefinition {
    /// Leaky bucket: `bucket_size` drops, draining `drain_rate` per second
    LeakyBucket { bucket_size: f64, drain_rate: f64 },
    /// Fixed window: `requests_per_unit` admissions per `unit`
    FixedWindow {
        requests_per_unit: u32,
        unit: TimeWindow,
    },
}

impl RuleDefinition {
    /// Build a fresh, empty rule reading time from `clock`.
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<Box<dyn Rule>> {
        let rule: Box<dyn Rule> = match *self {
            RuleDefinition::LeakyBucket {
                bucket_size,
                drain_rate,
            } => Box::new(LeakyBucket::with_clock(bucket_size, drain_rate, clock)?),
            RuleDefinition::FixedWindow {
                requests_per_unit,
                unit,
            } => Box::new(FixedWindow::with_clock(requests_per_unit, unit, clock)?),
        };
        Ok(rule)
    }

    /// Check the parameters by building and discarding a rule.
    pub fn validate(&self) -> Result<()> {
        self.build(Arc::new(SystemClock)).map(|_| ())
    }
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named rule.
    pub fn with_rule(mut self, name: impl Into<String>, definition: RuleDefinition) -> Self {
        self.rules.insert(name.into(), definition);
        self
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RuleSet = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttle rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Validate every definition, naming the offending rule on failure.
    pub fn validate(&self) -> Result<()> {
        for (name, definition) in &self.rules {
            definition.validate().map_err(|e| match e {
                ThrottleError::Config(msg) => ThrottleError::Config(format!("rule '{}': {}", name, msg)),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Get the definition for a named rule.
    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.get(name)
    }
}
