//! Rule Set snapshot loader
//!
//! A [`RuleSet`] is built once per installation from the store's current
//! `entries` list and never mutated afterwards.

use std::collections::HashMap;

use log::{debug, warn};
use serde_json::Value;

use super::record::RuleRecord;
use crate::types::Rule;

/// Point-in-time mapping from exact URL to rule.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, Rule>,
    skipped: usize,
}

impl RuleSet {
    /// A snapshot with no rules; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from decoded rules. On duplicate URLs the later rule wins.
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let mut map = HashMap::new();
        for rule in rules {
            map.insert(rule.url.clone(), rule);
        }
        Self { rules: map, skipped: 0 }
    }

    /// Build from stored records, skipping records that fail to decode.
    pub fn from_records(records: &[RuleRecord]) -> Self {
        let mut skipped = 0usize;
        let rules: Vec<Rule> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match record.to_rule() {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("skipping rule record #{}: {}", index, e);
                    skipped += 1;
                    None
                }
            })
            .collect();

        let mut set = Self::from_rules(rules);
        set.skipped = skipped;
        debug!("loaded rule set: {} rules, {} skipped", set.len(), set.skipped);
        set
    }

    /// Build from the raw `entries` value. Anything other than an array
    /// degrades to an empty set; malformed elements are skipped.
    pub fn from_entries_value(entries: &Value) -> Self {
        let Some(items) = entries.as_array() else {
            if !entries.is_null() {
                warn!("rule entries are not a list; using no rules");
            }
            return Self::empty();
        };

        let mut skipped = 0usize;
        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value::<RuleRecord>(item.clone()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("skipping malformed rule record #{}: {}", index, e);
                    skipped += 1;
                }
            }
        }

        let mut set = Self::from_records(&records);
        set.skipped += skipped;
        set
    }

    /// Build from the JSON text of the `entries` list.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_entries_value(&value),
            Err(e) => {
                warn!("rule entries are not valid JSON ({}); using no rules", e);
                Self::empty()
            }
        }
    }

    /// Exact lookup by full URL string.
    #[inline]
    pub fn get(&self, url: &str) -> Option<&Rule> {
        self.rules.get(url)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of stored records that were dropped while loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_entries_is_empty() {
        assert!(RuleSet::from_entries_value(&Value::Null).is_empty());
        assert!(RuleSet::from_entries_value(&json!({"url": "x"})).is_empty());
        assert!(RuleSet::from_json("not json").is_empty());
        assert!(RuleSet::from_json("[]").is_empty());
    }

    #[test]
    fn test_later_duplicate_wins() {
        let set = RuleSet::from_entries_value(&json!([
            {"id": 1, "url": "https://a/b", "verb": "GET", "errorCode": 404},
            {"id": 2, "url": "https://a/b", "verb": "POST", "errorCode": 500},
        ]));
        assert_eq!(set.len(), 1);
        let rule = set.get("https://a/b").unwrap();
        assert_eq!(rule.verb, "POST");
        assert_eq!(rule.outcome.status, 500);
    }

    #[test]
    fn test_invalid_records_are_skipped() {
        let set = RuleSet::from_entries_value(&json!([
            {"id": 1, "url": "https://a/b", "verb": "GET", "errorCode": "nope"},
            {"id": 2, "url": "https://a/c", "verb": "GET", "errorCode": 503},
            "garbage",
            {"id": 3, "verb": "GET", "errorCode": 500},
        ]));
        assert_eq!(set.len(), 1);
        assert_eq!(set.skipped(), 3);
        assert!(set.get("https://a/c").is_some());
        assert!(set.get("https://a/b").is_none());
    }

    #[test]
    fn test_lookup_is_exact() {
        let set = RuleSet::from_json(
            r#"[{"id": 1, "url": "https://a/b?x=1", "verb": "GET", "errorCode": 404}]"#,
        );
        assert!(set.get("https://a/b?x=1").is_some());
        assert!(set.get("https://a/b").is_none());
        assert!(set.get("https://a/b?x=2").is_none());
    }
}
