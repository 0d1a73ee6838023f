//! WebAssembly page agent for Backend Simulator
//!
//! Runs in the page's main world. The content script passes in the stored
//! `enabled`/`entries` values and relays storage change notifications; the
//! agent keeps `window.XMLHttpRequest` pointing at either the original
//! constructor or the intercepting one.

mod constructor;
mod logger;
mod native;
mod page;
mod request;

use std::cell::RefCell;

use js_sys::{Function, Reflect, JSON};
use log::{debug, warn};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use bs_core::{
    store::parse_enabled, Bridge, BridgeState, MatchKind, MemoryStore, RequestBinding, StoreChange,
    Variant,
};

pub use logger::set_log_level;
pub use native::{NativeXhr, XhrFactory};
pub use page::DomContext;
pub use request::SimulatedRequest;

const XHR_GLOBAL: &str = "XMLHttpRequest";

struct Runtime {
    bridge: Bridge<XhrFactory>,
    store: MemoryStore,
    page: DomContext,
    window: Window,
    original: Function,
    replacement: Function,
    _factory: Closure<dyn Fn() -> JsValue>,
}

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = RefCell::new(None);
}

impl Runtime {
    fn new(window: Window, variant: Variant, enabled: bool, entries: Value) -> Result<Self, JsValue> {
        let original: Function = Reflect::get(&window, &JsValue::from_str(XHR_GLOBAL))?
            .dyn_into()
            .map_err(|_| JsValue::from_str("XMLHttpRequest is not available"))?;

        let factory = Closure::<dyn Fn() -> JsValue>::new(construct_request);
        let replacement = constructor::build(factory.as_ref(), &original);
        let page = DomContext::new(window.clone(), Closure::<dyn FnMut()>::new(run_idle));

        Ok(Self {
            bridge: Bridge::new(RequestBinding::new(XhrFactory::new(original.clone()), variant)),
            store: MemoryStore::new(enabled, entries),
            page,
            window,
            original,
            replacement,
            _factory: factory,
        })
    }

    fn start(&mut self) -> Result<(), JsValue> {
        self.bridge.start(&self.store, &mut self.page);
        self.sync_window()
    }

    fn idle(&mut self) -> Result<(), JsValue> {
        self.page.idle_fired();
        self.bridge.on_idle(&self.store, &mut self.page);
        self.sync_window()
    }

    fn apply(&mut self, change: &StoreChange) -> Result<(), JsValue> {
        if let Some(enabled) = change.enabled {
            self.store.set_enabled(enabled);
        }
        if let Some(entries) = &change.entries {
            self.store.set_entries(entries.clone());
        }
        self.bridge.on_change(change, &self.store, &mut self.page);
        self.sync_window()
    }

    /// Point the page's global at whichever constructor the binding resolves to.
    fn sync_window(&self) -> Result<(), JsValue> {
        let installed = self.bridge.binding().is_installed();
        let target: &JsValue = if installed { &self.replacement } else { &self.original };
        let key = JsValue::from_str(XHR_GLOBAL);
        if &Reflect::get(&self.window, &key)? != target {
            Reflect::set(&self.window, &key, target)?;
            debug!(
                "window.{} now {}",
                XHR_GLOBAL,
                if installed { "intercepting" } else { "native" }
            );
        }
        Ok(())
    }
}

/// A handle for the replacement constructor, or `undefined` to have it fall
/// back to the original.
fn construct_request() -> JsValue {
    let request = RUNTIME.with(|cell| {
        cell.try_borrow()
            .ok()
            .and_then(|slot| slot.as_ref().map(|runtime| runtime.bridge.binding().construct()))
    });
    match request {
        Some(request) if !request.actual().as_js().is_undefined() => SimulatedRequest::new(request).into(),
        _ => JsValue::UNDEFINED,
    }
}

fn run_idle() {
    if let Err(e) = with_runtime(Runtime::idle) {
        warn!("Idle install attempt failed: {:?}", e);
    }
}

fn with_runtime<T>(f: impl FnOnce(&mut Runtime) -> Result<T, JsValue>) -> Result<T, JsValue> {
    RUNTIME.with(|cell| {
        let mut slot = cell
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("Backend Simulator is busy"))?;
        let runtime = slot
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Not started. Call start() first."))?;
        f(runtime)
    })
}

/// Convert a structured-clone value from the extension storage to JSON.
fn to_json(value: &JsValue) -> Value {
    if value.is_undefined() {
        return Value::Null;
    }
    JSON::stringify(value)
        .ok()
        .map(String::from)
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

fn set_field(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = Reflect::set(target, &JsValue::from_str(key), value);
}

// =============================================================================
// Exports
// =============================================================================

/// Page load: read the stored flag and rule list, install when enabled.
#[wasm_bindgen]
pub fn start(enabled: JsValue, entries: JsValue, variant: &str) -> Result<(), JsValue> {
    logger::init();

    if is_started() {
        return Err(JsValue::from_str("Already started. Reload the page to restart."));
    }

    let variant: Variant = variant.parse().map_err(|e: String| JsValue::from_str(&e))?;
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let mut runtime = Runtime::new(window, variant, parse_enabled(&to_json(&enabled)), to_json(&entries))?;
    runtime.start()?;

    RUNTIME.with(|cell| *cell.borrow_mut() = Some(runtime));
    Ok(())
}

/// Storage change notification (`{key: {oldValue, newValue}}`).
#[wasm_bindgen]
pub fn on_storage_changed(changes: JsValue) -> Result<(), JsValue> {
    let change = StoreChange::from_changes(&to_json(&changes));
    if change.is_empty() {
        return Ok(());
    }
    with_runtime(|runtime| runtime.apply(&change))
}

/// Restore the original constructor and release the agent.
#[wasm_bindgen]
pub fn stop() -> Result<(), JsValue> {
    let runtime = RUNTIME.with(|cell| cell.try_borrow_mut().ok().and_then(|mut slot| slot.take()));
    match runtime {
        Some(mut runtime) => runtime.apply(&StoreChange::enabled(false)),
        None => Ok(()),
    }
}

#[wasm_bindgen]
pub fn is_started() -> bool {
    RUNTIME.with(|cell| cell.try_borrow().map_or(true, |slot| slot.is_some()))
}

#[wasm_bindgen]
pub fn is_installed() -> bool {
    RUNTIME.with(|cell| {
        cell.try_borrow()
            .ok()
            .and_then(|slot| slot.as_ref().map(|runtime| runtime.bridge.binding().is_installed()))
            .unwrap_or(false)
    })
}

#[wasm_bindgen]
pub fn get_status() -> JsValue {
    let result = js_sys::Object::new();
    RUNTIME.with(|cell| {
        let slot = cell.try_borrow().ok();
        match slot.as_ref().and_then(|slot| slot.as_ref()) {
            Some(runtime) => {
                let binding = runtime.bridge.binding();
                let state = match runtime.bridge.state() {
                    BridgeState::Disabled => "disabled",
                    BridgeState::Pending => "pending",
                    BridgeState::Installed => "installed",
                };
                let rule_count = binding.matcher().map_or(0, |matcher| matcher.rules().len());
                set_field(&result, "started", &JsValue::from(true));
                set_field(&result, "state", &JsValue::from_str(state));
                set_field(&result, "variant", &JsValue::from_str(binding.variant().as_str()));
                set_field(&result, "ruleCount", &JsValue::from(rule_count as u32));
                set_field(&result, "retryScheduled", &JsValue::from(runtime.page.has_pending()));
            }
            None => set_field(&result, "started", &JsValue::from(false)),
        }
    });
    result.into()
}

/// What a completed `verb url` request would turn into under the current
/// snapshot.
#[wasm_bindgen]
pub fn match_request(url: &str, verb: &str) -> JsValue {
    let result = js_sys::Object::new();
    set_field(&result, "matched", &JsValue::from(false));

    RUNTIME.with(|cell| {
        let Ok(slot) = cell.try_borrow() else { return };
        let Some(matcher) = slot.as_ref().and_then(|runtime| runtime.bridge.binding().matcher().cloned()) else {
            return;
        };
        let Some(found) = matcher.match_request(url, verb) else { return };

        let substitution = found.substitution(matcher.variant());
        let kind = match found.kind {
            MatchKind::Exact => "exact",
            MatchKind::Partial => "partial",
        };
        set_field(&result, "matched", &JsValue::from(true));
        set_field(&result, "ruleId", &JsValue::from(found.rule.id.0 as f64));
        set_field(&result, "kind", &JsValue::from_str(kind));
        set_field(&result, "status", &JsValue::from(substitution.status));
        if let Some(status_text) = &substitution.status_text {
            set_field(&result, "statusText", &JsValue::from_str(status_text));
        }
        set_field(&result, "responseText", &JsValue::from_str(&substitution.body.text()));
    });

    result.into()
}
