//! Persisted rule records
//!
//! The record shape is what the settings UI stores and what the configuration
//! source transmits. Older records carry a single `sitePattern` and may lack
//! fields added later; [`RuleRecord::migrate`] upgrades them in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use sb_core::{FilterConfig, KeywordSet, MatchType, Rule};

use crate::error::ConfigError;

/// One rule as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// An unset flag never activates the rule
    #[serde(default)]
    pub enabled: bool,
    /// `simple`, `contains` or `regex`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_patterns: Option<Vec<String>>,
    /// Legacy single pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl RuleRecord {
    /// Fill defaults and upgrade legacy fields. `index` is the record's
    /// position, used for the default name. Returns true if anything changed.
    pub fn migrate(&mut self, index: usize) -> bool {
        let before = self.clone();

        if self.name.as_deref().map_or(true, |name| name.trim().is_empty()) {
            self.name = Some(format!("Rule {}", index + 1));
        }
        if self.match_type.is_none() {
            self.match_type = Some(MatchType::Wildcard.as_external().to_string());
        }
        if let Some(legacy) = self.site_pattern.take() {
            if self.site_patterns.is_none() {
                self.site_patterns = Some(vec![legacy]);
            }
        }
        let patterns = self.site_patterns.get_or_insert_with(|| vec!["*".to_string()]);
        clean_list(patterns);
        clean_list(self.keywords.get_or_insert_with(Vec::new));

        *self != before
    }

    /// Core rule for this record. Unknown match types yield a rule that never
    /// matches.
    pub fn to_rule(&self, index: usize) -> Rule {
        let mut record = self.clone();
        record.migrate(index);

        let name = record.name.unwrap_or_default();
        let external = record.match_type.unwrap_or_default();
        let (match_type, site_patterns) = match MatchType::from_external(&external) {
            Some(match_type) => (match_type, record.site_patterns.unwrap_or_default()),
            None => {
                log::warn!("rule {:?}: unknown match type {:?}, rule disabled", name, external);
                (MatchType::Wildcard, Vec::new())
            }
        };

        Rule {
            name,
            enabled: record.enabled,
            match_type,
            site_patterns,
            keywords: record.keywords.unwrap_or_default().iter().collect::<KeywordSet>(),
        }
    }
}

fn clean_list(values: &mut Vec<String>) {
    for value in values.iter_mut() {
        let trimmed = value.trim();
        if trimmed.len() != value.len() {
            *value = trimmed.to_string();
        }
    }
    values.retain(|value| !value.is_empty());
}

/// Migrate every record. Returns true if any record changed, so the caller
/// knows to persist the upgraded form.
pub fn migrate_records(records: &mut [RuleRecord]) -> bool {
    let mut changed = false;
    for (index, record) in records.iter_mut().enumerate() {
        changed |= record.migrate(index);
    }
    changed
}

/// The full configuration as supplied by the configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RawConfig {
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub global_whitelist: Vec<String>,
    #[serde(default)]
    pub secondary_whitelist: Vec<String>,
}

impl RawConfig {
    /// Strict parse of the whole document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse each slice independently. A malformed slice is empty; a malformed
    /// document is an empty configuration.
    pub fn from_json_lenient(text: &str) -> Self {
        let document: Value = match serde_json::from_str(text) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("malformed configuration, using empty configuration: {}", e);
                return Self::default();
            }
        };
        let Value::Object(mut fields) = document else {
            log::warn!("configuration is not an object, using empty configuration");
            return Self::default();
        };

        Self {
            rules: slice_from_value(fields.remove("rules"), "rules"),
            global_whitelist: slice_from_value(fields.remove("globalWhitelist"), "globalWhitelist"),
            secondary_whitelist: slice_from_value(fields.remove("secondaryWhitelist"), "secondaryWhitelist"),
        }
    }

    /// Migrate records and tidy whitelists. Returns true if anything changed.
    pub fn migrate(&mut self) -> bool {
        let mut changed = migrate_records(&mut self.rules);
        for list in [&mut self.global_whitelist, &mut self.secondary_whitelist] {
            let before = list.clone();
            clean_list(list);
            changed |= *list != before;
        }
        changed
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Core configuration for the resolver.
    pub fn to_filter_config(&self) -> FilterConfig {
        let mut global_whitelist = self.global_whitelist.clone();
        let mut secondary_whitelist = self.secondary_whitelist.clone();
        clean_list(&mut global_whitelist);
        clean_list(&mut secondary_whitelist);

        FilterConfig {
            rules: self
                .rules
                .iter()
                .enumerate()
                .map(|(index, record)| record.to_rule(index))
                .collect(),
            global_whitelist,
            secondary_whitelist,
        }
    }
}

/// Decode one slice; anything unexpected is an empty slice.
pub(crate) fn slice_from_value<T>(value: Option<Value>, slice: &str) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            log::warn!("malformed {} slice, treating as empty: {}", slice, e);
            Vec::new()
        }),
    }
}
