//! # secwatch-rs
//!
//! Security event correlation and alerting engine.
//!
//! This crate ingests raw security occurrences, normalizes them into enriched
//! events with salted actor identities, maintains a decaying per-actor risk
//! ledger, evaluates time-windowed correlation rules, manages incident
//! lifecycles, and dispatches fault-isolated response actions through
//! pluggable outbound boundaries.

pub mod boundary;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod housekeeping;
pub mod incident;
pub mod logging;
pub mod risk;
pub mod rules;

pub use config::EngineConfig;
pub use engine::{EngineStats, RecordOutcome, SecurityEngine};
pub use error::{Error, Result};
