//! Store document
//!
//! File-backed stand-in for the extension's storage area: a JSON object with
//! the `enabled` flag and the `entries` list. Reading is lenient; a missing
//! file is an empty, disabled store and malformed fields fall back to their
//! defaults.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, warn};
use serde_json::{Map, Value};

use bs_core::store::{enabled_value, parse_enabled, RuleStore, ENABLED_KEY, ENTRIES_KEY};

use crate::list::RuleList;
use crate::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreDocument {
    pub enabled: bool,
    /// Raw entries array, kept as stored until rewritten
    pub entries: Value,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            enabled: false,
            entries: Value::Array(Vec::new()),
        }
    }
}

impl StoreDocument {
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let enabled = value.get(ENABLED_KEY).map(parse_enabled).unwrap_or(false);
        let entries = match value.get(ENTRIES_KEY) {
            Some(entries @ Value::Array(_)) => entries.clone(),
            Some(other) => {
                warn!("Ignoring non-array entries: {}", other);
                Value::Array(Vec::new())
            }
            None => Value::Array(Vec::new()),
        };
        Self { enabled, entries }
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(ENABLED_KEY.to_string(), enabled_value(self.enabled));
        object.insert(ENTRIES_KEY.to_string(), self.entries.clone());
        Value::Object(object)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Load from `path`; a missing file yields the default document.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No store at {}; starting empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut text = self.to_json()?;
        text.push('\n');
        fs::write(path, text)?;
        debug!("Saved store to {}", path.display());
        Ok(())
    }

    pub fn rules(&self) -> RuleList {
        RuleList::from_entries(&self.entries)
    }

    pub fn set_rules(&mut self, rules: &RuleList) {
        self.entries = rules.to_entries();
    }
}

impl RuleStore for StoreDocument {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn entries(&self) -> Value {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleDraft;
    use serde_json::json;

    #[test]
    fn test_lenient_fields() {
        let doc = StoreDocument::from_json(r#"{"enabled": 1, "entries": "nope"}"#).unwrap();
        assert_eq!(doc, StoreDocument::default());

        let doc = StoreDocument::from_json(r#"{"enabled": "1"}"#).unwrap();
        assert!(doc.enabled);
        assert_eq!(doc.entries, json!([]));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(StoreDocument::from_json("{"), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let doc = StoreDocument::load(&dir.path().join("store.json")).unwrap();
        assert_eq!(doc, StoreDocument::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut rules = RuleList::new();
        rules
            .add_at(&RuleDraft::new("https://a/b", "get", "404").with_body("{}"), 7)
            .unwrap();
        let mut doc = StoreDocument { enabled: true, ..StoreDocument::default() };
        doc.set_rules(&rules);
        doc.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["enabled"], json!("1"));

        let loaded = StoreDocument::load(&path).unwrap();
        assert!(RuleStore::enabled(&loaded));
        assert_eq!(loaded.rules(), rules);
    }
}
