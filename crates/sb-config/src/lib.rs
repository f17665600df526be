//! Script Blocker Configuration
//!
//! This crate turns the persisted configuration (`{rules, globalWhitelist,
//! secondaryWhitelist}` as JSON) into the core rule types, upgrades legacy rule
//! records, mirrors the configuration into page-embedded metadata, and loads it
//! from an external source with bounded retries.

pub mod error;
pub mod handoff;
pub mod record;
pub mod source;

pub use error::ConfigError;
pub use handoff::{decode_handoff, HandoffSlices};
pub use record::{migrate_records, RawConfig, RuleRecord};
pub use source::{load_with_retry, ConfigSource, LoadOutcome, RetryPolicy, Sleep};
