//! Request Proxy
//!
//! A drop-in substitute for the native request type. Each proxy owns exactly
//! one native instance ("actual") for its whole lifetime and relays the
//! capability table to it. The only transition it hooks is the native
//! instance reaching DONE: the Matcher is consulted against the snapshot the
//! proxy was created under, the observable completion fields are frozen
//! (substituted on match, copied otherwise), and then the page's
//! ready-state-change hook is forwarded.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;

use crate::matcher::Matcher;
use crate::relay::{Operation, Property};
use crate::types::{ReadyState, SubstitutedBody, Substitution};

/// Hook the native instance invokes on every ready-state change.
///
/// Implementations must not hold internal borrows while invoking it: the hook
/// reads the native instance through the reference it is given, and page code
/// behind it may call back into the same instance (`abort()` from a handler
/// fires DONE again before returning).
pub type ReadyStateHook<N> = Rc<dyn Fn(&N)>;

/// Page-registered ready-state-change handler. Re-entrant, like a native
/// event handler.
pub type PageHook = Rc<dyn Fn()>;

// =============================================================================
// Native Request
// =============================================================================

/// The native request primitive the proxy wraps.
///
/// Implementations are handles onto one underlying instance, so every method
/// takes `&self`; state changes fire the ready-state hook synchronously.
pub trait NativeRequest: Sized + 'static {
    /// Page-facing value (property values, method arguments and results).
    /// `Default` is the "undefined" value.
    type Value: Clone + Default + 'static;
    /// Error raised by the native instance, relayed unchanged.
    type Error: Clone + fmt::Debug + 'static;

    fn ready_state(&self) -> u16;
    /// Final URL after redirects; empty until known.
    fn response_url(&self) -> String;
    fn status(&self) -> u16;
    fn status_text(&self) -> String;
    fn response(&self) -> Result<Self::Value, Self::Error>;
    fn response_text(&self) -> Result<String, Self::Error>;

    /// Read a relayed property.
    fn get(&self, property: Property) -> Result<Self::Value, Self::Error>;
    /// Write a relayed property.
    fn set(&self, property: Property, value: Self::Value) -> Result<(), Self::Error>;
    /// Invoke a passthrough method.
    fn call(&self, operation: Operation, args: &[Self::Value]) -> Result<Self::Value, Self::Error>;

    /// Replace the ready-state-change hook (`None` clears it).
    fn set_ready_state_hook(&self, hook: Option<ReadyStateHook<Self>>);

    /// Wrap a string as a page-facing value.
    fn text_value(text: &str) -> Self::Value;
    /// Wrap a JSON document as a page-facing value.
    fn json_value(value: &serde_json::Value) -> Self::Value;
    /// Read a page-facing value as a string, if it is one.
    fn value_text(value: &Self::Value) -> Option<String>;
}

/// Error type for proxy operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProxyError<E: fmt::Debug> {
    #[error("Property '{0}' is read-only")]
    ReadOnly(&'static str),
    #[error("Native request error: {0:?}")]
    Native(E),
}

// =============================================================================
// Completion
// =============================================================================

/// Observable fields frozen when the native instance reaches DONE.
#[derive(Debug, Clone)]
pub struct Completion<V, E> {
    pub status: u16,
    pub status_text: String,
    pub response: Result<V, E>,
    pub response_text: Result<String, E>,
    pub substituted: bool,
}

impl<V, E> Completion<V, E> {
    /// Copy the native fields unchanged.
    pub fn native<N>(actual: &N) -> Self
    where
        N: NativeRequest<Value = V, Error = E>,
    {
        Self {
            status: actual.status(),
            status_text: actual.status_text(),
            response: actual.response(),
            response_text: actual.response_text(),
            substituted: false,
        }
    }

    /// Apply a substitution on top of the native status text.
    pub fn substituted<N>(actual: &N, substitution: &Substitution) -> Self
    where
        N: NativeRequest<Value = V, Error = E>,
    {
        let response = match &substitution.body {
            SubstitutedBody::Text(text) => N::text_value(text),
            SubstitutedBody::Json(value) => N::json_value(value),
        };
        Self {
            status: substitution.status,
            status_text: substitution
                .status_text
                .clone()
                .unwrap_or_else(|| actual.status_text()),
            response: Ok(response),
            response_text: Ok(substitution.body.text()),
            substituted: true,
        }
    }
}

// =============================================================================
// Proxy
// =============================================================================

struct ProxyState<N: NativeRequest> {
    matcher: Arc<Matcher>,
    verb: Option<String>,
    completion: Option<Completion<N::Value, N::Error>>,
    on_ready_state_change: Option<PageHook>,
}

/// Substitute request bound 1:1 to a native instance.
pub struct RequestProxy<N: NativeRequest> {
    actual: N,
    state: Rc<RefCell<ProxyState<N>>>,
}

impl<N: NativeRequest> RequestProxy<N> {
    /// Wrap `actual`; completions are matched against `matcher`'s snapshot.
    pub fn new(actual: N, matcher: Arc<Matcher>) -> Self {
        let state = Rc::new(RefCell::new(ProxyState {
            matcher,
            verb: None,
            completion: None,
            on_ready_state_change: None,
        }));

        let weak = Rc::downgrade(&state);
        actual.set_ready_state_hook(Some(Rc::new(move |native: &N| {
            if let Some(state) = weak.upgrade() {
                relay_ready_state_change(&state, native);
            }
        })));

        Self { actual, state }
    }

    /// The wrapped native instance.
    pub fn actual(&self) -> &N {
        &self.actual
    }

    /// Verb captured by `open()` / `setMethod()`.
    pub fn verb(&self) -> Option<String> {
        self.state.borrow().verb.clone()
    }

    /// Whether the frozen completion carries a substitution.
    pub fn is_substituted(&self) -> bool {
        self.state
            .borrow()
            .completion
            .as_ref()
            .map_or(false, |c| c.substituted)
    }

    pub fn ready_state(&self) -> u16 {
        self.actual.ready_state()
    }

    pub fn response_url(&self) -> String {
        self.actual.response_url()
    }

    pub fn status(&self) -> u16 {
        match &self.state.borrow().completion {
            Some(completion) => completion.status,
            None => self.actual.status(),
        }
    }

    pub fn status_text(&self) -> String {
        match &self.state.borrow().completion {
            Some(completion) => completion.status_text.clone(),
            None => self.actual.status_text(),
        }
    }

    pub fn response(&self) -> Result<N::Value, N::Error> {
        match &self.state.borrow().completion {
            Some(completion) => completion.response.clone(),
            None => self.actual.response(),
        }
    }

    pub fn response_text(&self) -> Result<String, N::Error> {
        match &self.state.borrow().completion {
            Some(completion) => completion.response_text.clone(),
            None => self.actual.response_text(),
        }
    }

    /// Read a relayed property. `method` reads the captured verb.
    pub fn get(&self, property: Property) -> Result<N::Value, ProxyError<N::Error>> {
        if property == Property::Method {
            return Ok(self
                .verb()
                .map(|verb| N::text_value(&verb))
                .unwrap_or_default());
        }
        self.actual.get(property).map_err(ProxyError::Native)
    }

    /// Write a relayed property. `method` overwrites the captured verb.
    pub fn set(&self, property: Property, value: N::Value) -> Result<(), ProxyError<N::Error>> {
        if !property.is_writable() {
            return Err(ProxyError::ReadOnly(property.name()));
        }
        if property == Property::Method {
            self.state.borrow_mut().verb = N::value_text(&value);
            return Ok(());
        }
        self.actual.set(property, value).map_err(ProxyError::Native)
    }

    /// Invoke a passthrough method, capturing the verb on `open`/`setMethod`.
    /// No proxy state is borrowed while the native call runs.
    pub fn call(&self, operation: Operation, args: &[N::Value]) -> Result<N::Value, ProxyError<N::Error>> {
        if operation.captures_verb() {
            let verb = args.first().and_then(N::value_text);
            let mut state = self.state.borrow_mut();
            state.verb = verb;
            if operation == Operation::SetMethod {
                return Ok(N::Value::default());
            }
            // Reopening resets the native fields; drop the frozen ones too.
            state.completion = None;
        }
        self.actual.call(operation, args).map_err(ProxyError::Native)
    }

    /// Register (or clear) the page's ready-state-change handler.
    pub fn set_on_ready_state_change(&self, hook: Option<PageHook>) {
        self.state.borrow_mut().on_ready_state_change = hook;
    }

    pub fn has_on_ready_state_change(&self) -> bool {
        self.state.borrow().on_ready_state_change.is_some()
    }
}

impl<N: NativeRequest> Drop for RequestProxy<N> {
    fn drop(&mut self) {
        self.actual.set_ready_state_hook(None);
    }
}

/// Decorate-then-forward: freeze the completion fields on DONE, then invoke
/// the page hook so it observes the frozen values.
fn relay_ready_state_change<N: NativeRequest>(state: &Rc<RefCell<ProxyState<N>>>, native: &N) {
    if native.ready_state() == ReadyState::Done as u16 {
        let completion = {
            let state = state.borrow();
            let resolved_url = native.response_url();
            let verb = state.verb.as_deref().unwrap_or("");
            match state.matcher.substitution_for(&resolved_url, verb) {
                Some(substitution) => {
                    debug!(
                        "substituting {} {} with status {}",
                        verb, resolved_url, substitution.status
                    );
                    Completion::substituted(native, &substitution)
                }
                None => Completion::native(native),
            }
        };
        state.borrow_mut().completion = Some(completion);
    }

    let hook = state.borrow().on_ready_state_change.clone();
    if let Some(hook) = hook {
        hook();
    }
}
