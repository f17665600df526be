//! Suppression journal
//!
//! Every suppression is logged once. The dedupe key is the hook name, the
//! keyword and a fingerprint of the blocked content, so the same payload hitting
//! the same hook repeatedly produces a single record.

use std::collections::HashSet;
use std::fmt;

use crate::hash::fingerprint;
use crate::types::{Finding, Surface};

/// Log target for block events.
pub const LOG_TARGET: &str = "script_blocker::block";

const PREVIEW_LIMIT: usize = 666;

/// The interception point that suppressed something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    CreateElement,
    AppendChild,
    InsertBefore,
    ReplaceChild,
    DocumentWrite,
    DocumentWriteln,
    Eval,
    FunctionConstructor,
    SetTimeout,
    SetInterval,
    Worker,
    SharedWorker,
    ServiceWorker,
    MutationWatcher,
    ModuleWatcher,
    DataUriWatcher,
    AntiDevtools,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateElement => "createElement",
            Self::AppendChild => "appendChild",
            Self::InsertBefore => "insertBefore",
            Self::ReplaceChild => "replaceChild",
            Self::DocumentWrite => "document.write",
            Self::DocumentWriteln => "document.writeln",
            Self::Eval => "eval",
            Self::FunctionConstructor => "Function",
            Self::SetTimeout => "setTimeout",
            Self::SetInterval => "setInterval",
            Self::Worker => "Worker",
            Self::SharedWorker => "SharedWorker",
            Self::ServiceWorker => "serviceWorker.register",
            Self::MutationWatcher => "MutationObserver",
            Self::ModuleWatcher => "module script observer",
            Self::DataUriWatcher => "data URI observer",
            Self::AntiDevtools => "anti-devtools",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One suppression event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub hook: HookPoint,
    pub keyword: String,
    pub surface: Surface,
    /// Blocked content, truncated for display
    pub preview: String,
    pub fingerprint: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupeKey {
    hook: HookPoint,
    keyword: String,
    fingerprint: u64,
}

/// Deduplicated record of every suppression on the page.
#[derive(Debug, Default)]
pub struct BlockJournal {
    seen: HashSet<DedupeKey>,
    records: Vec<BlockRecord>,
}

impl BlockJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding. Returns false when the same event was already recorded.
    pub fn record(&mut self, hook: HookPoint, finding: &Finding) -> bool {
        let fingerprint = fingerprint(&finding.matched_text);
        let key = DedupeKey {
            hook,
            keyword: finding.keyword.clone(),
            fingerprint,
        };
        if !self.seen.insert(key) {
            return false;
        }

        let preview = truncate(&finding.matched_text, PREVIEW_LIMIT);
        log::info!(
            target: LOG_TARGET,
            "{} blocked keyword {:?} in {}: {}",
            hook,
            finding.keyword,
            finding.surface,
            preview
        );

        self.records.push(BlockRecord {
            hook,
            keyword: finding.keyword.clone(),
            surface: finding.surface,
            preview,
            fingerprint,
        });
        true
    }

    pub fn records(&self) -> &[BlockRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Cut `content` to at most `limit` characters, marking the cut with `...`.
pub fn truncate(content: &str, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_dedupes_same_event() {
        let mut journal = BlockJournal::new();
        let finding = Finding::new("evil", "evil()", Surface::EvalText);
        assert!(journal.record(HookPoint::Eval, &finding));
        assert!(!journal.record(HookPoint::Eval, &finding));
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_record_distinguishes_hook_and_content() {
        let mut journal = BlockJournal::new();
        let finding = Finding::new("evil", "evil()", Surface::EvalText);
        assert!(journal.record(HookPoint::Eval, &finding));
        assert!(journal.record(HookPoint::SetTimeout, &finding));
        let other = Finding::new("evil", "evil(2)", Surface::EvalText);
        assert!(journal.record(HookPoint::Eval, &other));
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.records()[1].hook, HookPoint::SetTimeout);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 2), "éé...");
    }
}
