//! Rule Resolver
//!
//! Runs once per page load (and again on every configuration change) to turn
//! the operator's rules into the keyword set for the current page.
//!
//! Order of evaluation:
//! 1. Global whitelist (operator + built-in): skip the page entirely.
//! 2. Secondary whitelist: keep filtering, but in partial mode.
//! 3. Every enabled rule whose site patterns match the URL or host contributes
//!    its keywords (union; `FirstMatch` is available as an alternative policy).
//! 4. No keywords: skip the page.

use crate::pattern::Pattern;
use crate::types::{ActivePolicy, FilterConfig, KeywordSet, MatchType, MergePolicy, PageContext, Rule};

/// Built-in global whitelist, merged with the operator's.
pub const BUILTIN_GLOBAL_WHITELIST: &[&str] = &["index.m3u8"];

/// Built-in secondary whitelist, merged with the operator's.
pub const BUILTIN_SECONDARY_WHITELIST: &[&str] = &["bilibili", "deepseek.com", "douyin"];

/// Why the page is not filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// URL or host matched this global-whitelist pattern
    GlobalWhitelist(String),
    /// No enabled rule matched the page
    NoMatchingRule,
    /// Rules matched but contributed no keywords
    NoKeywords,
}

/// Result of resolving the configuration against a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Skip(SkipReason),
    Active(ActivePolicy),
}

impl Resolution {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn policy(&self) -> Option<&ActivePolicy> {
        match self {
            Self::Active(policy) => Some(policy),
            Self::Skip(_) => None,
        }
    }
}

/// Resolver knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub merge_policy: MergePolicy,
    /// Merge the built-in whitelists with the operator's
    pub builtin_whitelists: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::Union,
            builtin_whitelists: true,
        }
    }
}

/// Resolve with the default options.
pub fn resolve(page: &PageContext, config: &FilterConfig) -> Resolution {
    resolve_with(page, config, &ResolverOptions::default())
}

/// Resolve the configuration for `page`.
pub fn resolve_with(page: &PageContext, config: &FilterConfig, options: &ResolverOptions) -> Resolution {
    let (builtin_global, builtin_secondary) = if options.builtin_whitelists {
        (BUILTIN_GLOBAL_WHITELIST, BUILTIN_SECONDARY_WHITELIST)
    } else {
        (&[][..], &[][..])
    };

    let global = merge_whitelist(builtin_global, &config.global_whitelist);
    if let Some(pattern) = whitelist_hit(page, &global) {
        log::info!("global whitelist hit ({:?}) for {}, filtering disabled", pattern, page.url);
        return Resolution::Skip(SkipReason::GlobalWhitelist(pattern.to_string()));
    }

    let secondary = merge_whitelist(builtin_secondary, &config.secondary_whitelist);
    let partial = match whitelist_hit(page, &secondary) {
        Some(pattern) => {
            log::info!("secondary whitelist hit ({:?}) for {}, partial filtering", pattern, page.url);
            true
        }
        None => false,
    };

    let mut keywords = KeywordSet::new();
    let mut matched_rules = Vec::new();

    for rule in config.rules.iter().filter(|rule| rule.enabled) {
        if !rule_matches(rule, page) {
            continue;
        }
        log::debug!("rule {:?} matches {}", rule.name, page.host);
        keywords.union_with(&rule.keywords);
        matched_rules.push(rule.name.clone());
        if options.merge_policy == MergePolicy::FirstMatch {
            break;
        }
    }

    if matched_rules.is_empty() {
        log::debug!("no rule matches {}", page.url);
        return Resolution::Skip(SkipReason::NoMatchingRule);
    }
    if keywords.is_empty() {
        log::debug!("matching rules for {} carry no keywords", page.url);
        return Resolution::Skip(SkipReason::NoKeywords);
    }

    log::info!(
        "{} rule(s) matched {}, {} keyword(s) active",
        matched_rules.len(),
        page.host,
        keywords.len()
    );

    Resolution::Active(ActivePolicy {
        keywords,
        partial,
        matched_rules,
    })
}

/// Union of built-in and operator patterns, first occurrence kept.
pub fn merge_whitelist(builtin: &[&str], operator: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(builtin.len() + operator.len());
    for pattern in builtin.iter().copied().chain(operator.iter().map(String::as_str)) {
        if !pattern.is_empty() && !merged.iter().any(|existing| existing == pattern) {
            merged.push(pattern.to_string());
        }
    }
    merged
}

/// First whitelist pattern matching the page, by wildcard or substring.
fn whitelist_hit<'a>(page: &PageContext, patterns: &'a [String]) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| {
            [MatchType::Wildcard, MatchType::Substring].into_iter().any(|mode| {
                Pattern::compile(pattern, mode)
                    .map(|compiled| compiled.matches_page(&page.url, &page.host))
                    .unwrap_or(false)
            })
        })
        .map(String::as_str)
}

/// A rule matches when any of its site patterns matches the URL or host.
pub fn rule_matches(rule: &Rule, page: &PageContext) -> bool {
    rule.site_patterns
        .iter()
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| match Pattern::compile(pattern, rule.match_type) {
            Ok(compiled) => compiled.matches_page(&page.url, &page.host),
            Err(err) => {
                log::warn!("rule {:?}: {}", rule.name, err);
                false
            }
        })
}
