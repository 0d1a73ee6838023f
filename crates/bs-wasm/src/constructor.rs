//! Replacement request constructor
//!
//! The page-facing object is a plain JS object built from the capability
//! table once, when the constructor is created. It owns its native instance,
//! its `onreadystatechange` handler and the Rust handle; the native points
//! back at it. Every strong edge between them is a JS edge, so the garbage
//! collector sees the whole cycle and the handle's finalizer runs once the
//! page lets go.

use js_sys::{Array, Function};
use wasm_bindgen::prelude::*;

use bs_core::relay::{Access, Capability, CAPABILITIES};
use bs_core::ReadyState;

#[wasm_bindgen(inline_js = r#"
const HANDLE = Symbol("handle");
const NATIVE = Symbol("native");
const OWNER = Symbol("owner");
const HANDLER = Symbol("onreadystatechange");

export function make_constructor(factory, original, constants, surface) {
    function XMLHttpRequest() {
        if (!new.target) {
            throw new TypeError("Failed to construct 'XMLHttpRequest': Please use the 'new' operator.");
        }
        const handle = factory();
        if (handle === undefined) {
            return new original();
        }
        const native = handle.native;
        this[HANDLE] = handle;
        this[NATIVE] = native;
        this[HANDLER] = null;
        native[OWNER] = this;
    }

    const proto = XMLHttpRequest.prototype;
    for (const [name, kind] of surface) {
        if (kind === "method") {
            proto[name] = function (...args) {
                return this[HANDLE].relayCall(name, args);
            };
            continue;
        }
        Object.defineProperty(proto, name, {
            get() {
                return this[HANDLE].relayGet(name);
            },
            set: kind === "readwrite"
                ? function (value) { this[HANDLE].relaySet(name, value); }
                : undefined,
            enumerable: true,
            configurable: true,
        });
    }
    Object.defineProperty(proto, "onreadystatechange", {
        get() {
            return this[HANDLER];
        },
        set(value) {
            this[HANDLER] = typeof value === "function" ? value : null;
            this[HANDLE].watchReadyState(this[HANDLER] !== null);
        },
        enumerable: true,
        configurable: true,
    });
    for (const [name, value] of constants) {
        Object.defineProperty(XMLHttpRequest, name, { value, enumerable: true });
        Object.defineProperty(proto, name, { value, enumerable: true });
    }
    return XMLHttpRequest;
}

export function dispatch_ready_state_change(native) {
    const page = native == null ? undefined : native[OWNER];
    const handler = page === undefined ? null : page[HANDLER];
    if (typeof handler === "function") {
        handler.call(page);
    }
}
"#)]
extern "C" {
    fn make_constructor(factory: &JsValue, original: &Function, constants: &JsValue, surface: &JsValue) -> Function;

    /// Call the owning page object's handler with the page object as `this`.
    #[wasm_bindgen(catch)]
    pub(crate) fn dispatch_ready_state_change(native: &JsValue) -> Result<(), JsValue>;
}

/// Completion fields: read-only on the page object, answered by the proxy.
const COMPLETION_FIELDS: [&str; 5] = ["status", "statusText", "response", "responseText", "isIntercepted"];

/// Build the intercepting constructor. `factory` returns a
/// `SimulatedXMLHttpRequest` handle, or `undefined` to fall back to `original`.
pub(crate) fn build(factory: &JsValue, original: &Function) -> Function {
    make_constructor(factory, original, &ready_state_constants(), &relay_surface())
}

fn pair(name: &str, value: &JsValue) -> JsValue {
    Array::of2(&JsValue::from_str(name), value).into()
}

/// `[name, "readonly" | "readwrite" | "method"]` per relayed name.
fn relay_surface() -> JsValue {
    let surface = Array::new();
    for capability in CAPABILITIES {
        let kind = match capability {
            Capability::Property(_, _, Access::ReadOnly) => "readonly",
            Capability::Property(_, _, Access::ReadWrite) => "readwrite",
            Capability::Method(..) => "method",
        };
        surface.push(&pair(capability.name(), &JsValue::from_str(kind)));
    }
    for name in COMPLETION_FIELDS {
        surface.push(&pair(name, &JsValue::from_str("readonly")));
    }
    surface.into()
}

fn ready_state_constants() -> JsValue {
    let constants = Array::new();
    for (name, state) in [
        ("UNSENT", ReadyState::Unsent),
        ("OPENED", ReadyState::Opened),
        ("HEADERS_RECEIVED", ReadyState::HeadersReceived),
        ("LOADING", ReadyState::Loading),
        ("DONE", ReadyState::Done),
    ] {
        constants.push(&pair(name, &JsValue::from(state as u16)));
    }
    constants.into()
}
