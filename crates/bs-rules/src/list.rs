//! Ordered rule list
//!
//! Mirrors what the options page does to the stored `entries` array: rules
//! keep their editing order, new rules get an epoch-millisecond id and
//! updates replace a rule where it stands.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde_json::Value;

use bs_core::snapshot::RuleRecord;
use bs_core::types::{Rule, RuleId};

use crate::draft::RuleDraft;
use crate::shadow::{find_shadowed, Shadowed};
use crate::RuleError;

/// A stored entry that does not decode into a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEntry {
    /// Position in the stored list
    pub index: usize,
    pub reason: String,
}

/// Split a stored `entries` value into decodable rules and the rest.
/// Anything but an array holds no entries.
pub fn decode_entries(entries: &Value) -> (Vec<Rule>, Vec<InvalidEntry>) {
    let mut rules = Vec::new();
    let mut invalid = Vec::new();
    for (index, item) in entries.as_array().into_iter().flatten().enumerate() {
        let decoded = serde_json::from_value::<RuleRecord>(item.clone())
            .map_err(|e| e.to_string())
            .and_then(|record| record.to_rule().map_err(|e| e.to_string()));
        match decoded {
            Ok(rule) => rules.push(rule),
            Err(reason) => invalid.push(InvalidEntry { index, reason }),
        }
    }
    (rules, invalid)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleList {
    rules: Vec<Rule>,
    last_id: u64,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let last_id = rules.iter().map(|rule| rule.id.0).max().unwrap_or(0);
        Self { rules, last_id }
    }

    /// Decode a stored `entries` value.
    ///
    /// Records that fail to decode are dropped with a warning; saving the
    /// list afterwards removes them from the store.
    pub fn from_entries(entries: &Value) -> Self {
        let (rules, invalid) = decode_entries(entries);
        for entry in &invalid {
            warn!("Dropping entry {}: {}", entry.index, entry.reason);
        }
        Self::from_rules(rules)
    }

    /// Encode as a stored `entries` value.
    pub fn to_entries(&self) -> Value {
        Value::Array(
            self.rules
                .iter()
                .map(|rule| serde_json::to_value(RuleRecord::from(rule)).unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Validate `draft` and append it under a fresh id.
    pub fn add(&mut self, draft: &RuleDraft) -> Result<Rule, RuleError> {
        self.add_at(draft, now_millis())
    }

    /// Like [`add`](Self::add) with an explicit clock reading.
    pub fn add_at(&mut self, draft: &RuleDraft, now_ms: u64) -> Result<Rule, RuleError> {
        let id = RuleId(now_ms.max(self.last_id + 1));
        let rule = draft.validate(id)?;
        self.last_id = id.0;
        debug!("Added rule {} {} {}", rule.id, rule.verb, rule.url);
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// Replace the rule with `id` in place, or append when there is none.
    pub fn update(&mut self, id: RuleId, draft: &RuleDraft) -> Result<Rule, RuleError> {
        let rule = draft.validate(id)?;
        match self.rules.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = rule.clone(),
            None => {
                self.last_id = self.last_id.max(id.0);
                self.rules.push(rule.clone());
            }
        }
        Ok(rule)
    }

    pub fn remove(&mut self, id: RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        self.rules.len() != before
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Rules hidden by a later rule with the same URL.
    pub fn shadowed(&self) -> Vec<Shadowed> {
        find_shadowed(&self.rules)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(url: &str, code: &str) -> RuleDraft {
        RuleDraft::new(url, "get", code)
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut list = RuleList::new();
        let first = list.add_at(&draft("https://a/1", "500"), 1000).unwrap();
        let second = list.add_at(&draft("https://a/2", "500"), 1000).unwrap();
        let third = list.add_at(&draft("https://a/3", "500"), 900).unwrap();

        assert_eq!(first.id, RuleId(1000));
        assert_eq!(second.id, RuleId(1001));
        assert_eq!(third.id, RuleId(1002));
        assert_eq!(first.verb, "GET");
    }

    #[test]
    fn test_add_rejects_invalid_draft_without_consuming_id() {
        let mut list = RuleList::new();
        assert!(list.add_at(&draft("https://a", "oops"), 50).is_err());
        assert!(list.is_empty());
        assert_eq!(list.add_at(&draft("https://a", "404"), 50).unwrap().id, RuleId(50));
    }

    #[test]
    fn test_add_uses_wall_clock() {
        let mut list = RuleList::new();
        let rule = list.add(&draft("https://a", "404")).unwrap();
        assert!(rule.id.0 > 1_600_000_000_000);
    }

    #[test]
    fn test_update_in_place_or_append() {
        let mut list = RuleList::new();
        list.add_at(&draft("https://a/1", "500"), 10).unwrap();
        list.add_at(&draft("https://a/2", "500"), 20).unwrap();

        list.update(RuleId(10), &draft("https://a/1", "418").with_body("teapot"))
            .unwrap();
        let order: Vec<u64> = list.iter().map(|rule| rule.id.0).collect();
        assert_eq!(order, vec![10, 20]);
        assert_eq!(list.get(RuleId(10)).unwrap().outcome.status, 418);

        list.update(RuleId(99), &draft("https://a/9", "503")).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.add_at(&draft("https://a/x", "500"), 0).unwrap().id, RuleId(100));
    }

    #[test]
    fn test_update_rejects_invalid_draft() {
        let mut list = RuleList::new();
        list.add_at(&draft("https://a/1", "500"), 10).unwrap();
        assert!(list.update(RuleId(10), &draft("", "500")).is_err());
        assert_eq!(list.get(RuleId(10)).unwrap().url, "https://a/1");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut list = RuleList::new();
        list.add_at(&draft("https://a/1", "500"), 10).unwrap();
        list.add_at(&draft("https://a/2", "500"), 20).unwrap();

        assert!(list.remove(RuleId(10)));
        assert!(!list.remove(RuleId(10)));
        assert_eq!(list.len(), 1);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_entries_round_trip_preserves_order() {
        let entries = json!([
            {"id": 2, "url": "https://a/2", "verb": "GET", "errorCode": "500"},
            {"id": 1, "url": "https://a/1", "verb": "POST", "responseCode": 404,
             "responseValue": "nope", "partialUrlMatch": true},
            {"url": "https://a/3"}
        ]);
        let list = RuleList::from_entries(&entries);
        assert_eq!(list.len(), 2);

        let reloaded = RuleList::from_entries(&list.to_entries());
        assert_eq!(reloaded, list);
        let ids: Vec<u64> = reloaded.iter().map(|rule| rule.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_decode_entries_reports_positions() {
        let entries = json!([
            {"id": 1, "url": "https://a/1", "verb": "GET", "errorCode": 500},
            {"id": 2, "url": "https://a/2", "verb": "GET", "errorCode": "5xx"},
            "garbage"
        ]);
        let (rules, invalid) = decode_entries(&entries);
        assert_eq!(rules.len(), 1);
        let positions: Vec<usize> = invalid.iter().map(|entry| entry.index).collect();
        assert_eq!(positions, vec![1, 2]);
        assert!(invalid[0].reason.contains("5xx"));
    }

    #[test]
    fn test_from_entries_tolerates_non_array() {
        assert!(RuleList::from_entries(&Value::Null).is_empty());
        assert!(RuleList::from_entries(&json!({"url": "x"})).is_empty());
    }
}
