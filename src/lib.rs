//! Throttle - leaky bucket admission control
//!
//! This crate decides, per request and per identity, whether a request is
//! admitted or throttled. Rules keep no background timers: a leaky bucket
//! drains lazily from the time elapsed since its last logged observation,
//! and its `(observed_at, volume)` state is persisted between requests by a
//! pluggable state store.

pub mod clock;
pub mod config;
pub mod error;
pub mod throttle;
