//! Native XMLHttpRequest adapter
//!
//! Every access goes through `Reflect` with the capability table's names so
//! the adapter relays exactly what the table declares. The adapter holds its
//! instance through a `WeakRef`: the page object owns the instance, and a
//! strong reference from the wasm heap would pin the page object (and
//! everything its handlers close over) for the page's lifetime.

use std::cell::RefCell;

use js_sys::{Array, Function, Object, Reflect, TypeError, WeakRef, JSON};
use log::{error, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use bs_core::install::RequestFactory;
use bs_core::proxy::{NativeRequest, ReadyStateHook};
use bs_core::relay::{Operation, Property};

const READY_STATE_HANDLER: &str = "onreadystatechange";

/// One instance built by the page's original request constructor.
pub struct NativeXhr {
    target: Option<WeakRef>,
    handler: RefCell<Option<Closure<dyn Fn()>>>,
}

impl NativeXhr {
    pub fn new(instance: &JsValue) -> Self {
        let target = instance
            .is_object()
            .then(|| WeakRef::new(instance.unchecked_ref::<Object>()));
        Self {
            target,
            handler: RefCell::new(None),
        }
    }

    /// The native instance; `undefined` if construction failed or the
    /// instance has been collected.
    pub fn as_js(&self) -> JsValue {
        self.target
            .as_ref()
            .and_then(|target| target.deref())
            .map_or(JsValue::UNDEFINED, JsValue::from)
    }

    /// Another adapter over the same instance that owns no handler.
    pub(crate) fn view(&self) -> Self {
        Self {
            target: self.target.clone(),
            handler: RefCell::new(None),
        }
    }

    fn read(&self, name: &str) -> Result<JsValue, JsValue> {
        Reflect::get(&self.as_js(), &JsValue::from_str(name))
    }

    fn read_number(&self, name: &str) -> u16 {
        self.read(name)
            .ok()
            .and_then(|value| value.as_f64())
            .map(|value| value as u16)
            .unwrap_or(0)
    }

    fn read_string(&self, name: &str) -> String {
        self.read(name)
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default()
    }

    fn install_handler(&self, handler: &JsValue) {
        let target = self.as_js();
        if target.is_undefined() {
            return;
        }
        if let Err(e) = Reflect::set(&target, &JsValue::from_str(READY_STATE_HANDLER), handler) {
            warn!("Failed to set {}: {:?}", READY_STATE_HANDLER, e);
        }
    }
}

impl NativeRequest for NativeXhr {
    type Value = JsValue;
    type Error = JsValue;

    fn ready_state(&self) -> u16 {
        self.read_number("readyState")
    }

    fn response_url(&self) -> String {
        self.read_string("responseURL")
    }

    fn status(&self) -> u16 {
        self.read_number("status")
    }

    fn status_text(&self) -> String {
        self.read_string("statusText")
    }

    fn response(&self) -> Result<JsValue, JsValue> {
        self.read("response")
    }

    fn response_text(&self) -> Result<String, JsValue> {
        self.read("responseText")
            .map(|value| value.as_string().unwrap_or_default())
    }

    fn get(&self, property: Property) -> Result<JsValue, JsValue> {
        self.read(property.name())
    }

    fn set(&self, property: Property, value: JsValue) -> Result<(), JsValue> {
        Reflect::set(&self.as_js(), &JsValue::from_str(property.name()), &value).map(|_| ())
    }

    fn call(&self, operation: Operation, args: &[JsValue]) -> Result<JsValue, JsValue> {
        let name = operation.name();
        let method: Function = self
            .read(name)?
            .dyn_into()
            .map_err(|_| JsValue::from(TypeError::new(&format!("{} is not a function", name))))?;
        method.apply(&self.as_js(), &args.iter().collect::<Array>())
    }

    /// `Fn`, not `FnMut`: the native fires the handler again from inside it
    /// when page code calls `open()` or `abort()` there.
    fn set_ready_state_hook(&self, hook: Option<ReadyStateHook<Self>>) {
        let closure = hook.map(|hook| {
            let view = self.view();
            Closure::<dyn Fn()>::new(move || hook(&view))
        });
        let handler = closure
            .as_ref()
            .map_or(JsValue::NULL, |closure| closure.as_ref().clone());
        self.install_handler(&handler);
        // A replaced closure that is still running is released when it returns.
        *self.handler.borrow_mut() = closure;
    }

    fn text_value(text: &str) -> JsValue {
        JsValue::from_str(text)
    }

    fn json_value(value: &serde_json::Value) -> JsValue {
        JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL)
    }

    fn value_text(value: &JsValue) -> Option<String> {
        value.as_string()
    }
}

impl Drop for NativeXhr {
    fn drop(&mut self) {
        if self.handler.get_mut().take().is_some() {
            self.install_handler(&JsValue::NULL);
        }
    }
}

/// Builds natives from the constructor saved before installation.
pub struct XhrFactory {
    constructor: Function,
}

impl XhrFactory {
    pub fn new(constructor: Function) -> Self {
        Self { constructor }
    }

    pub fn constructor(&self) -> &Function {
        &self.constructor
    }
}

impl RequestFactory for XhrFactory {
    type Request = NativeXhr;

    /// The caller must hand the instance to a strong owner before the
    /// current task ends.
    fn create(&self) -> NativeXhr {
        let instance = Reflect::construct(&self.constructor, &Array::new()).unwrap_or_else(|e| {
            error!("Failed to construct native request: {:?}", e);
            JsValue::UNDEFINED
        });
        NativeXhr::new(&instance)
    }
}
