//! Script Blocker Core Library
//!
//! This crate provides the interception engine for the Script Blocker content filter.
//! It decides, for any candidate script-bearing value (DOM node, string, function,
//! URL), whether it carries a blocked keyword and must be suppressed.
//!
//! # Architecture
//!
//! The resolver runs once per page load and turns the operator's site rules into a
//! keyword set. The interceptor then sits between the page and every platform entry
//! point that can run script, consulting the content inspector before delegating to
//! the original behavior. The platform itself is reached only through the
//! [`InterceptableHost`] trait, so the browser adapter and the in-memory test host
//! are interchangeable.
//!
//! # Modules
//!
//! - `pattern`: wildcard / substring / regex site pattern matching
//! - `resolver`: site rules + whitelists -> keyword set for the current page
//! - `inspector`: keyword search over every observable surface of a node
//! - `intercept`: the hooks, routing candidates through the inspector
//! - `watcher`: backstop for nodes inserted behind the hooks' back
//! - `registry`: per-node side records (processed outcome, script write guard)
//! - `journal`: deduplicated suppression records
//! - `antidebug`: optional devtools-blocking countermeasure removal
//! - `host`: the platform boundary and node views
//! - `hash`: Murmur3 content fingerprints
//! - `url`: scheme, host and data URI helpers
//! - `types`: shared type definitions

pub mod antidebug;
pub mod hash;
pub mod host;
pub mod inspector;
pub mod intercept;
pub mod journal;
pub mod pattern;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod url;
pub mod watcher;

#[cfg(test)]
mod fake;

// Re-export commonly used types
pub use host::{InterceptableHost, NodeRecord, NodeView, ScriptPayload};
pub use inspector::ContentInspector;
pub use intercept::{InstallOptions, Interceptor};
pub use pattern::{matches, Pattern, PatternError};
pub use resolver::{resolve, Resolution, ResolverOptions, SkipReason};
pub use types::{
    ActivePolicy, FilterConfig, Finding, HookSet, KeywordSet, MatchType, MergePolicy,
    PageContext, Rule, Surface,
};
