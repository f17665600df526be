//! Site pattern matching
//!
//! A pattern is compiled once per resolution and tested against both the page
//! URL and the page host. Compilation failures never abort resolution: the
//! pattern simply never matches.

use regex::{Regex, RegexBuilder};

use crate::types::MatchType;

/// Error compiling a site pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled site pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Anchored and unanchored forms of the same wildcard expression
    Wildcard { anchored: Regex, partial: Regex },
    Substring(String),
    Regex(Regex),
}

impl Pattern {
    /// Compile `pattern` for the given match type.
    pub fn compile(pattern: &str, match_type: MatchType) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        match match_type {
            MatchType::Wildcard => {
                let expr = wildcard_to_regex(pattern);
                let anchored = build_case_insensitive(&format!("^(?:{expr})$"), pattern)?;
                let partial = build_case_insensitive(&expr, pattern)?;
                Ok(Self::Wildcard { anchored, partial })
            }
            MatchType::Substring => Ok(Self::Substring(pattern.to_string())),
            MatchType::Regex => Ok(Self::Regex(build_case_insensitive(pattern, pattern)?)),
        }
    }

    /// Test a single text.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            // Full match catches `*.example.com`, containment catches partial hosts
            Self::Wildcard { anchored, partial } => anchored.is_match(text) || partial.is_match(text),
            Self::Substring(needle) => text.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(text),
        }
    }

    /// Test the URL, then the host.
    pub fn matches_page(&self, url: &str, host: &str) -> bool {
        self.is_match(url) || self.is_match(host)
    }
}

fn build_case_insensitive(expr: &str, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(expr)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

/// Escape every metacharacter except `*`, which becomes `.*`.
pub fn wildcard_to_regex(pattern: &str) -> String {
    regex::escape(pattern).replace(r"\*", ".*")
}

/// One-shot match. Empty and uncompilable patterns never match.
pub fn matches(text: &str, pattern: &str, match_type: MatchType) -> bool {
    match Pattern::compile(pattern, match_type) {
        Ok(compiled) => compiled.is_match(text),
        Err(err) => {
            log::debug!("pattern {:?} ignored: {}", pattern, err);
            false
        }
    }
}
