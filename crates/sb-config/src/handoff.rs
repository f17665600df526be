//! Page-embedded handoff
//!
//! The page-level context cannot reach the configuration source, so the
//! configuration is mirrored into one `<meta>` element per slice. The `content`
//! attribute holds that slice's JSON. Reading is lenient per slice: an absent
//! element or malformed JSON is an empty slice.

use serde_json::Value;

use crate::error::ConfigError;
use crate::record::{slice_from_value, RawConfig};

pub const RULES_META: &str = "script-blocker-rules";
pub const GLOBAL_WHITELIST_META: &str = "script-blocker-global";
pub const SECONDARY_WHITELIST_META: &str = "script-blocker-secondary";

/// Meta element names, in publishing order.
pub const META_NAMES: [&str; 3] = [RULES_META, GLOBAL_WHITELIST_META, SECONDARY_WHITELIST_META];

/// The JSON content of each meta element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSlices {
    pub rules: String,
    pub global_whitelist: String,
    pub secondary_whitelist: String,
}

impl HandoffSlices {
    pub fn encode(config: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: serde_json::to_string(&config.rules)?,
            global_whitelist: serde_json::to_string(&config.global_whitelist)?,
            secondary_whitelist: serde_json::to_string(&config.secondary_whitelist)?,
        })
    }

    /// `(meta name, content)` pairs.
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            (RULES_META, self.rules.as_str()),
            (GLOBAL_WHITELIST_META, self.global_whitelist.as_str()),
            (SECONDARY_WHITELIST_META, self.secondary_whitelist.as_str()),
        ]
    }

    /// Markup for the three elements.
    pub fn to_meta_html(&self) -> String {
        self.entries()
            .iter()
            .map(|(name, content)| format!("<meta name=\"{}\" content=\"{}\">", name, escape_attribute(content)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Rebuild the configuration from the `content` of each meta element.
pub fn decode_handoff(rules: Option<&str>, global: Option<&str>, secondary: Option<&str>) -> RawConfig {
    RawConfig {
        rules: slice_from_value(parse_slice(rules, RULES_META), RULES_META),
        global_whitelist: slice_from_value(parse_slice(global, GLOBAL_WHITELIST_META), GLOBAL_WHITELIST_META),
        secondary_whitelist: slice_from_value(
            parse_slice(secondary, SECONDARY_WHITELIST_META),
            SECONDARY_WHITELIST_META,
        ),
    }
}

fn parse_slice(content: Option<&str>, name: &str) -> Option<Value> {
    let content = content?.trim();
    if content.is_empty() {
        return None;
    }
    match serde_json::from_str(content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("malformed {} metadata, treating as empty: {}", name, e);
            None
        }
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
