//! Page context backed by the DOM

use js_sys::{Function, Reflect};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use bs_core::bridge::PageContext;

/// Retry delay where `requestIdleCallback` is unavailable.
const IDLE_FALLBACK_MS: i32 = 50;

enum Pending {
    Idle(u32),
    Timeout(i32),
}

pub struct DomContext {
    window: Window,
    callback: Closure<dyn FnMut()>,
    pending: Option<Pending>,
}

impl DomContext {
    /// `callback` runs at each idle point the bridge asks for.
    pub fn new(window: Window, callback: Closure<dyn FnMut()>) -> Self {
        Self {
            window,
            callback,
            pending: None,
        }
    }

    /// Mark the scheduled callback as consumed.
    pub fn idle_fired(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl PageContext for DomContext {
    fn document_ready(&self) -> bool {
        self.window
            .document()
            .map_or(false, |document| document.head().is_some() && document.body().is_some())
    }

    fn request_idle(&mut self) {
        let callback: &Function = self.callback.as_ref().unchecked_ref();
        let has_idle = Reflect::has(&self.window, &JsValue::from_str("requestIdleCallback")).unwrap_or(false);
        let scheduled = if has_idle {
            self.window.request_idle_callback(callback).map(Pending::Idle)
        } else {
            self.window
                .set_timeout_with_callback_and_timeout_and_arguments_0(callback, IDLE_FALLBACK_MS)
                .map(Pending::Timeout)
        };
        match scheduled {
            Ok(pending) => self.pending = Some(pending),
            Err(e) => warn!("Failed to schedule install retry: {:?}", e),
        }
    }
}

impl Drop for DomContext {
    fn drop(&mut self) {
        match self.pending.take() {
            Some(Pending::Idle(handle)) => self.window.cancel_idle_callback(handle),
            Some(Pending::Timeout(handle)) => self.window.clear_timeout_with_handle(handle),
            None => {}
        }
    }
}
