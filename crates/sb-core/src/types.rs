//! Core type definitions for Script Blocker
//!
//! These types are shared by the resolver, the inspector and the interceptor,
//! and are what the configuration crate produces from persisted rule records.

use std::fmt;

use crate::url::extract_host;

// =============================================================================
// Rules
// =============================================================================

/// How a rule's site patterns are compared against the page URL and host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchType {
    /// `*` wildcard, case-insensitive, anchored or contained
    #[default]
    Wildcard,
    /// Case-sensitive containment
    Substring,
    /// Case-insensitive regular expression
    Regex,
}

impl MatchType {
    /// Parse the persisted name (`simple`, `contains`, `regex`).
    pub fn from_external(name: &str) -> Option<Self> {
        match name {
            "simple" => Some(Self::Wildcard),
            "contains" => Some(Self::Substring),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }

    /// Persisted name of this match type.
    pub fn as_external(&self) -> &'static str {
        match self {
            Self::Wildcard => "simple",
            Self::Substring => "contains",
            Self::Regex => "regex",
        }
    }
}

/// Operator-defined association between site patterns and blocked keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub enabled: bool,
    pub match_type: MatchType,
    /// Ordered; an empty list never matches
    pub site_patterns: Vec<String>,
    pub keywords: KeywordSet,
}

impl Rule {
    pub fn new(name: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            match_type,
            site_patterns: Vec::new(),
            keywords: KeywordSet::new(),
        }
    }

    pub fn with_sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.site_patterns.extend(sites.into_iter().map(Into::into));
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(keywords);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Everything the configuration source supplies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub rules: Vec<Rule>,
    pub global_whitelist: Vec<String>,
    pub secondary_whitelist: Vec<String>,
}

/// How keywords of several matching rules are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Every matching rule contributes
    #[default]
    Union,
    /// Only the first matching rule in order contributes
    FirstMatch,
}

// =============================================================================
// Keyword Set
// =============================================================================

/// Deduplicated list of literal substrings. Empty keywords are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a keyword. Returns false for empty or duplicate keywords.
    pub fn insert(&mut self, keyword: &str) -> bool {
        if keyword.is_empty() || self.contains(keyword) {
            return false;
        }
        self.keywords.push(keyword.to_string());
        true
    }

    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            self.insert(keyword.as_ref());
        }
    }

    pub fn union_with(&mut self, other: &KeywordSet) {
        self.extend(other.iter());
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    /// First keyword contained in `text`.
    #[inline]
    pub fn find_in(&self, text: &str) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        self.keywords
            .iter()
            .find(|keyword| text.contains(keyword.as_str()))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = KeywordSet::new();
        set.extend(iter);
        set
    }
}

// =============================================================================
// Page Context
// =============================================================================

/// The page the filter is running in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub host: String,
}

impl PageContext {
    pub fn new(url: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            host: host.into(),
        }
    }

    /// Build a context whose host is taken from the URL.
    pub fn from_url(url: &str) -> Self {
        let host = extract_host(url).unwrap_or("").to_ascii_lowercase();
        Self::new(url, host)
    }
}

/// Outcome of resolution when the page is filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivePolicy {
    pub keywords: KeywordSet,
    /// Secondary whitelist hit: the most invasive hooks stay off
    pub partial: bool,
    /// Names of the rules that contributed keywords
    pub matched_rules: Vec<String>,
}

// =============================================================================
// Hook Set
// =============================================================================

bitflags::bitflags! {
    /// Interception points that are (or should be) installed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HookSet: u16 {
        /// document.createElement + script property writes
        const CREATE_ELEMENT = 1 << 0;
        /// appendChild / insertBefore / replaceChild
        const TREE_INSERTION = 1 << 1;
        /// document.write / writeln
        const MARKUP_WRITE = 1 << 2;
        /// window.eval
        const EVAL = 1 << 3;
        /// window.Function
        const FUNCTION_CONSTRUCTOR = 1 << 4;
        /// setTimeout / setInterval
        const TIMERS = 1 << 5;
        /// Worker / SharedWorker
        const WORKERS = 1 << 6;
        /// navigator.serviceWorker.register
        const SERVICE_WORKER = 1 << 7;
        /// Generic subtree observer
        const MUTATION_WATCHER = 1 << 8;
        /// Module script and data: URI script observer
        const SCRIPT_SOURCE_WATCHER = 1 << 9;
        /// Devtools-blocking handler removal (add-on)
        const ANTI_DEVTOOLS = 1 << 10;

        /// Everything the suppression guarantee relies on
        const CORE = Self::CREATE_ELEMENT.bits()
            | Self::TREE_INSERTION.bits()
            | Self::MARKUP_WRITE.bits()
            | Self::EVAL.bits()
            | Self::FUNCTION_CONSTRUCTOR.bits()
            | Self::TIMERS.bits()
            | Self::WORKERS.bits()
            | Self::SERVICE_WORKER.bits()
            | Self::MUTATION_WATCHER.bits()
            | Self::SCRIPT_SOURCE_WATCHER.bits();
        /// Hooks with the highest collateral damage, off in partial mode
        const INVASIVE = Self::CREATE_ELEMENT.bits() | Self::FUNCTION_CONSTRUCTOR.bits();
    }
}

impl HookSet {
    /// Hooks to install for an active policy.
    pub fn for_policy(policy: &ActivePolicy, anti_devtools: bool) -> Self {
        let mut hooks = Self::CORE;
        if policy.partial {
            hooks.remove(Self::INVASIVE);
        }
        if anti_devtools {
            hooks.insert(Self::ANTI_DEVTOOLS);
        }
        hooks
    }

    /// Lowercase names of the individual hooks, for display.
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .filter(|(_, flag)| flag.bits().count_ones() == 1)
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

// =============================================================================
// Findings
// =============================================================================

/// Script-bearing property of a `<script>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptProperty {
    Src,
    InnerHtml,
    TextContent,
}

impl ScriptProperty {
    pub const ALL: [ScriptProperty; 3] = [Self::Src, Self::InnerHtml, Self::TextContent];

    /// DOM property name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::InnerHtml => "innerHTML",
            Self::TextContent => "textContent",
        }
    }
}

/// Where a keyword was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    TextContent,
    Src,
    InlineHandler(&'static str),
    JavascriptUrl,
    DataUri,
    PluginResource,
    MetaRefresh,
    BaseHref,
    ScriptProperty(ScriptProperty),
    MarkupWrite,
    EvalText,
    EvalFunction,
    FunctionBody,
    TimerText,
    TimerFunction,
    WorkerUrl,
    ServiceWorkerUrl,
    ModuleScript,
    DevtoolsSignature,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextContent => f.write_str("text content"),
            Self::Src => f.write_str("src attribute"),
            Self::InlineHandler(attr) => write!(f, "inline handler {attr}"),
            Self::JavascriptUrl => f.write_str("javascript: pseudo-protocol"),
            Self::DataUri => f.write_str("data: script URI"),
            Self::PluginResource => f.write_str("object/embed script resource"),
            Self::MetaRefresh => f.write_str("meta refresh"),
            Self::BaseHref => f.write_str("base href"),
            Self::ScriptProperty(prop) => write!(f, "dynamic script {}", prop.as_str()),
            Self::MarkupWrite => f.write_str("document.write markup"),
            Self::EvalText => f.write_str("eval (string)"),
            Self::EvalFunction => f.write_str("eval (function)"),
            Self::FunctionBody => f.write_str("Function constructor body"),
            Self::TimerText => f.write_str("timer (string handler)"),
            Self::TimerFunction => f.write_str("timer (function handler)"),
            Self::WorkerUrl => f.write_str("worker script URL"),
            Self::ServiceWorkerUrl => f.write_str("service worker script URL"),
            Self::ModuleScript => f.write_str("module script"),
            Self::DevtoolsSignature => f.write_str("devtools-blocking handler"),
        }
    }
}

/// A blocked keyword found in a specific surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub keyword: String,
    /// The text the keyword was found in (decoded where applicable)
    pub matched_text: String,
    pub surface: Surface,
}

impl Finding {
    pub fn new(keyword: &str, matched_text: impl Into<String>, surface: Surface) -> Self {
        Self {
            keyword: keyword.to_string(),
            matched_text: matched_text.into(),
            surface,
        }
    }

    /// Human-readable description of where the keyword was found.
    pub fn source(&self) -> String {
        self.surface.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set_rejects_empty_and_duplicates() {
        let mut set = KeywordSet::new();
        assert!(set.insert("evil"));
        assert!(!set.insert("evil"));
        assert!(!set.insert(""));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_keyword_set_find_in() {
        let set: KeywordSet = ["ads", "track"].into_iter().collect();
        assert_eq!(set.find_in("window.track()"), Some("track"));
        assert_eq!(set.find_in("clean()"), None);
        assert_eq!(set.find_in(""), None);
    }

    #[test]
    fn test_match_type_external_names() {
        assert_eq!(MatchType::from_external("simple"), Some(MatchType::Wildcard));
        assert_eq!(MatchType::from_external("contains"), Some(MatchType::Substring));
        assert_eq!(MatchType::from_external("regex"), Some(MatchType::Regex));
        assert_eq!(MatchType::from_external("glob"), None);
        assert_eq!(MatchType::Substring.as_external(), "contains");
    }

    #[test]
    fn test_page_context_from_url() {
        let page = PageContext::from_url("https://Sub.Example.com:8080/a?b");
        assert_eq!(page.host, "sub.example.com");
    }

    #[test]
    fn test_hook_set_partial_drops_invasive() {
        let policy = ActivePolicy {
            keywords: ["x"].into_iter().collect(),
            partial: true,
            matched_rules: Vec::new(),
        };
        let hooks = HookSet::for_policy(&policy, false);
        assert!(!hooks.contains(HookSet::CREATE_ELEMENT));
        assert!(!hooks.contains(HookSet::FUNCTION_CONSTRUCTOR));
        assert!(hooks.contains(HookSet::EVAL));
        assert!(!hooks.contains(HookSet::ANTI_DEVTOOLS));
    }

    #[test]
    fn test_hook_set_names_skip_composites() {
        let names = (HookSet::EVAL | HookSet::TIMERS).names();
        assert_eq!(names, vec!["eval".to_string(), "timers".to_string()]);
    }

    #[test]
    fn test_finding_source_label() {
        let finding = Finding::new("evil", "x", Surface::InlineHandler("onclick"));
        assert_eq!(finding.source(), "inline handler onclick");
    }
}
