//! Rule store interface
//!
//! The persistent store lives outside the engine. It holds two keys:
//! `enabled` (`"0"`/`"1"`) and `entries` (the ordered rule records), and
//! notifies listeners with the new values of whichever keys changed.

use std::cell::RefCell;

use serde_json::Value;

/// Store key holding the enabled flag.
pub const ENABLED_KEY: &str = "enabled";
/// Store key holding the rule list.
pub const ENTRIES_KEY: &str = "entries";

/// Read access to the external rule store.
pub trait RuleStore {
    fn enabled(&self) -> bool;
    /// Raw `entries` value; `Value::Null` when absent.
    fn entries(&self) -> Value;
}

/// Interpret a stored `enabled` value. Only the string `"1"` enables.
pub fn parse_enabled(value: &Value) -> bool {
    value.as_str() == Some("1")
}

/// Stored representation of the enabled flag.
pub fn enabled_value(enabled: bool) -> Value {
    Value::from(if enabled { "1" } else { "0" })
}

/// New values of the keys touched by one change notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreChange {
    pub enabled: Option<bool>,
    pub entries: Option<Value>,
}

impl StoreChange {
    pub fn enabled(enabled: bool) -> Self {
        Self { enabled: Some(enabled), entries: None }
    }

    pub fn entries(entries: Value) -> Self {
        Self { enabled: None, entries: Some(entries) }
    }

    /// Decode a change map of the form `{key: {oldValue, newValue}}`.
    /// Keys without a `newValue` are treated as untouched.
    pub fn from_changes(changes: &Value) -> Self {
        let new_value = |key: &str| {
            changes
                .get(key)
                .and_then(|change| change.get("newValue"))
                .filter(|value| !value.is_null())
                .cloned()
        };
        Self {
            enabled: new_value(ENABLED_KEY).map(|value| parse_enabled(&value)),
            entries: new_value(ENTRIES_KEY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.entries.is_none()
    }
}

// =============================================================================
// In-memory store
// =============================================================================

type Listener = Box<dyn FnMut(&StoreChange)>;

/// Store kept in memory, with change notification.
#[derive(Default)]
pub struct MemoryStore {
    enabled: RefCell<bool>,
    entries: RefCell<Value>,
    listeners: RefCell<Vec<Listener>>,
}

impl MemoryStore {
    pub fn new(enabled: bool, entries: Value) -> Self {
        Self {
            enabled: RefCell::new(enabled),
            entries: RefCell::new(entries),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: impl FnMut(&StoreChange) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.borrow_mut() = enabled;
        self.notify(&StoreChange::enabled(enabled));
    }

    pub fn set_entries(&self, entries: Value) {
        *self.entries.borrow_mut() = entries.clone();
        self.notify(&StoreChange::entries(entries));
    }

    fn notify(&self, change: &StoreChange) {
        // Listeners registered while notifying are kept but not called.
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners.iter_mut() {
            listener(change);
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }
}

impl RuleStore for MemoryStore {
    fn enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    fn entries(&self) -> Value {
        self.entries.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_parse_enabled() {
        assert!(parse_enabled(&json!("1")));
        assert!(!parse_enabled(&json!("0")));
        assert!(!parse_enabled(&json!(1)));
        assert!(!parse_enabled(&Value::Null));
        assert_eq!(enabled_value(true), json!("1"));
    }

    #[test]
    fn test_from_changes() {
        let change = StoreChange::from_changes(&json!({
            "enabled": {"oldValue": "1", "newValue": "0"},
            "entries": {"oldValue": []}
        }));
        assert_eq!(change.enabled, Some(false));
        assert_eq!(change.entries, None);

        let change = StoreChange::from_changes(&json!({"entries": {"newValue": []}}));
        assert_eq!(change, StoreChange::entries(json!([])));
        assert!(StoreChange::from_changes(&json!({})).is_empty());
    }

    #[test]
    fn test_memory_store_notifies() {
        let store = MemoryStore::new(false, Value::Null);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        store.set_enabled(true);
        store.set_entries(json!([]));

        assert!(store.enabled());
        assert_eq!(store.entries(), json!([]));
        assert_eq!(
            *seen.borrow(),
            vec![StoreChange::enabled(true), StoreChange::entries(json!([]))]
        );
    }
}
