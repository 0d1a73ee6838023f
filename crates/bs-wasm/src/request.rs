//! Rust half of a page-facing request
//!
//! The object `new XMLHttpRequest()` returns is generated by the replacement
//! constructor; it forwards every relayed name to a [`SimulatedRequest`]
//! handle. All handle methods take `&self`: the native fires ready-state
//! changes synchronously inside `open()`, `abort()` and synchronous `send()`,
//! and the page's handler reads the same object back while that call is
//! still running.

use std::rc::Rc;

use js_sys::{Array, TypeError};
use log::error;
use wasm_bindgen::prelude::*;

use bs_core::install::PageRequest;
use bs_core::proxy::{PageHook, ProxyError};
use bs_core::relay::{Operation, Property};

use crate::constructor::dispatch_ready_state_change;
use crate::native::NativeXhr;

fn js_error(error: ProxyError<JsValue>) -> JsValue {
    match error {
        ProxyError::Native(e) => e,
        other => TypeError::new(&other.to_string()).into(),
    }
}

fn unknown(kind: &str, name: &str) -> JsValue {
    TypeError::new(&format!("Unknown {} '{}'", kind, name)).into()
}

#[wasm_bindgen(js_name = SimulatedXMLHttpRequest)]
pub struct SimulatedRequest {
    inner: PageRequest<NativeXhr>,
}

impl SimulatedRequest {
    pub fn new(inner: PageRequest<NativeXhr>) -> Self {
        Self { inner }
    }

    pub fn page_request(&self) -> &PageRequest<NativeXhr> {
        &self.inner
    }
}

#[wasm_bindgen(js_class = SimulatedXMLHttpRequest)]
impl SimulatedRequest {
    #[wasm_bindgen(getter, js_name = isIntercepted)]
    pub fn is_intercepted(&self) -> bool {
        self.inner.is_intercepted()
    }

    /// The native instance, for the page object to own.
    #[wasm_bindgen(getter)]
    pub fn native(&self) -> JsValue {
        self.inner.actual().as_js()
    }

    /// Read a page-facing field. Completion fields come from the proxy;
    /// everything else is relayed.
    #[wasm_bindgen(js_name = relayGet)]
    pub fn relay_get(&self, name: &str) -> Result<JsValue, JsValue> {
        match name {
            "status" => Ok(JsValue::from(self.inner.status())),
            "statusText" => Ok(JsValue::from(self.inner.status_text())),
            "response" => self.inner.response(),
            "responseText" => self.inner.response_text().map(JsValue::from),
            "isIntercepted" => Ok(JsValue::from(self.inner.is_intercepted())),
            _ => {
                let property = Property::from_name(name).ok_or_else(|| unknown("property", name))?;
                self.inner.get(property).map_err(js_error)
            }
        }
    }

    #[wasm_bindgen(js_name = relaySet)]
    pub fn relay_set(&self, name: &str, value: JsValue) -> Result<(), JsValue> {
        let property = Property::from_name(name).ok_or_else(|| unknown("property", name))?;
        self.inner.set(property, value).map_err(js_error)
    }

    /// Invoke a passthrough method with exactly the arguments the page
    /// passed.
    #[wasm_bindgen(js_name = relayCall)]
    pub fn relay_call(&self, name: &str, args: Array) -> Result<JsValue, JsValue> {
        let operation = Operation::from_name(name).ok_or_else(|| unknown("method", name))?;
        self.inner.call(operation, &args.to_vec()).map_err(js_error)
    }

    /// Called when the page object's `onreadystatechange` changes. The
    /// handler itself stays on the page object.
    #[wasm_bindgen(js_name = watchReadyState)]
    pub fn watch_ready_state(&self, enabled: bool) {
        let hook = enabled.then(|| {
            let native = self.inner.actual().view();
            Rc::new(move || {
                if let Err(e) = dispatch_ready_state_change(&native.as_js()) {
                    error!("onreadystatechange handler threw: {:?}", e);
                }
            }) as PageHook
        });
        self.inner.set_on_ready_state_change(hook);
    }
}
