//! Scripted native request
//!
//! An in-memory [`NativeRequest`] whose network side is driven by the caller.
//! Clones share state, so one clone can be handed to a proxy while another
//! plays the server: `respond()` walks the instance through
//! HEADERS_RECEIVED, LOADING and DONE, firing the ready-state hook at each
//! step the way a browser does.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::proxy::{NativeRequest, ReadyStateHook};
use crate::relay::{Operation, Property};
use crate::types::ReadyState;

/// Page-facing value of a scripted request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

impl ScriptValue {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Error type for scripted requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
}

/// What the scripted server answers with.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
    /// Final URL; `None` keeps the URL passed to `open()`
    pub final_url: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ScriptedResponse {
    pub fn new(status: u16, status_text: &str, body: &str) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            body: body.to_string(),
            final_url: None,
            headers: Vec::new(),
        }
    }

    /// `200 OK` with the given body.
    pub fn ok(body: &str) -> Self {
        Self::new(200, "OK", body)
    }

    pub fn redirected_to(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Default)]
struct ScriptedState {
    ready_state: u16,
    opened_url: String,
    sent: bool,
    response_url: String,
    status: u16,
    status_text: String,
    body: String,
    response_headers: Vec<(String, String)>,
    request_headers: Vec<(String, String)>,
    properties: HashMap<Property, ScriptValue>,
    operations: Vec<Operation>,
    hook: Option<ReadyStateHook<ScriptedRequest>>,
}

/// Shared-handle scripted request.
#[derive(Clone, Default)]
pub struct ScriptedRequest {
    inner: Rc<RefCell<ScriptedState>>,
}

impl ScriptedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a response to an opened and sent request.
    /// Returns `false` (and changes nothing) otherwise.
    pub fn respond(&self, response: ScriptedResponse) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.ready_state != ReadyState::Opened as u16 || !inner.sent {
                return false;
            }
            let final_url = match response.final_url {
                Some(url) => url,
                None => inner.opened_url.clone(),
            };
            inner.response_url = final_url;
            inner.status = response.status;
            inner.status_text = response.status_text;
            inner.response_headers = response.headers;
        }
        self.advance(ReadyState::HeadersReceived);
        if !self.still_at(ReadyState::HeadersReceived) {
            return true;
        }
        self.inner.borrow_mut().body = response.body;
        self.advance(ReadyState::Loading);
        if self.still_at(ReadyState::Loading) {
            self.advance(ReadyState::Done);
        }
        true
    }

    /// Fail at the transport level: DONE with status 0 and no URL.
    pub fn fail(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.sent || inner.ready_state == ReadyState::Done as u16 {
                return false;
            }
            reset_response(&mut inner);
        }
        self.advance(ReadyState::Done);
        true
    }

    /// Passthrough methods invoked so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.inner.borrow().operations.clone()
    }

    pub fn request_headers(&self) -> Vec<(String, String)> {
        self.inner.borrow().request_headers.clone()
    }

    pub fn has_ready_state_hook(&self) -> bool {
        self.inner.borrow().hook.is_some()
    }

    /// Fires the hook with no borrow held, so it may call back in.
    fn advance(&self, state: ReadyState) {
        self.inner.borrow_mut().ready_state = state as u16;
        let hook = self.inner.borrow().hook.clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    /// False once a hook aborted or reopened the request mid-response.
    fn still_at(&self, state: ReadyState) -> bool {
        let inner = self.inner.borrow();
        inner.sent && inner.ready_state == state as u16
    }

    fn response_type(&self) -> String {
        match self.inner.borrow().properties.get(&Property::ResponseType) {
            Some(ScriptValue::Text(kind)) => kind.clone(),
            _ => String::new(),
        }
    }
}

fn reset_response(inner: &mut ScriptedState) {
    inner.response_url.clear();
    inner.status = 0;
    inner.status_text.clear();
    inner.body.clear();
    inner.response_headers.clear();
}

fn arg_text(args: &[ScriptValue], index: usize, name: &'static str) -> Result<String, ScriptError> {
    match args.get(index) {
        Some(ScriptValue::Text(text)) => Ok(text.clone()),
        _ => Err(ScriptError::MissingArgument(name)),
    }
}

impl NativeRequest for ScriptedRequest {
    type Value = ScriptValue;
    type Error = ScriptError;

    fn ready_state(&self) -> u16 {
        self.inner.borrow().ready_state
    }

    fn response_url(&self) -> String {
        self.inner.borrow().response_url.clone()
    }

    fn status(&self) -> u16 {
        self.inner.borrow().status
    }

    fn status_text(&self) -> String {
        self.inner.borrow().status_text.clone()
    }

    fn response(&self) -> Result<ScriptValue, ScriptError> {
        let kind = self.response_type();
        let inner = self.inner.borrow();
        match kind.as_str() {
            "" | "text" => Ok(ScriptValue::Text(inner.body.clone())),
            "json" => {
                if inner.ready_state != ReadyState::Done as u16 {
                    return Ok(ScriptValue::Null);
                }
                Ok(serde_json::from_str(&inner.body)
                    .map(ScriptValue::Json)
                    .unwrap_or(ScriptValue::Null))
            }
            _ => Err(ScriptError::InvalidState("unsupported responseType")),
        }
    }

    fn response_text(&self) -> Result<String, ScriptError> {
        match self.response_type().as_str() {
            "" | "text" => Ok(self.inner.borrow().body.clone()),
            _ => Err(ScriptError::InvalidState("responseText needs a text responseType")),
        }
    }

    fn get(&self, property: Property) -> Result<ScriptValue, ScriptError> {
        let inner = self.inner.borrow();
        let value = match property {
            Property::ReadyState => ScriptValue::Number(inner.ready_state as f64),
            Property::ResponseUrl => ScriptValue::Text(inner.response_url.clone()),
            Property::ResponseXml => ScriptValue::Null,
            Property::ResponseType => inner
                .properties
                .get(&property)
                .cloned()
                .unwrap_or_else(|| ScriptValue::text("")),
            Property::Timeout => inner
                .properties
                .get(&property)
                .cloned()
                .unwrap_or(ScriptValue::Number(0.0)),
            Property::WithCredentials => inner
                .properties
                .get(&property)
                .cloned()
                .unwrap_or(ScriptValue::Bool(false)),
            _ => inner.properties.get(&property).cloned().unwrap_or_default(),
        };
        Ok(value)
    }

    fn set(&self, property: Property, value: ScriptValue) -> Result<(), ScriptError> {
        let mut inner = self.inner.borrow_mut();
        if property == Property::ResponseType && inner.ready_state >= ReadyState::Loading as u16 {
            return Err(ScriptError::InvalidState("responseType is locked while loading"));
        }
        inner.properties.insert(property, value);
        Ok(())
    }

    fn call(&self, operation: Operation, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        self.inner.borrow_mut().operations.push(operation);
        match operation {
            Operation::Open => {
                let verb = arg_text(args, 0, "method")?;
                let url = arg_text(args, 1, "url")?;
                {
                    let mut inner = self.inner.borrow_mut();
                    reset_response(&mut inner);
                    inner.properties.insert(Property::Method, ScriptValue::Text(verb));
                    inner.opened_url = url;
                    inner.sent = false;
                    inner.request_headers.clear();
                }
                self.advance(ReadyState::Opened);
                Ok(ScriptValue::Undefined)
            }
            Operation::Send => {
                let mut inner = self.inner.borrow_mut();
                if inner.ready_state != ReadyState::Opened as u16 || inner.sent {
                    return Err(ScriptError::InvalidState("send() before open()"));
                }
                inner.sent = true;
                Ok(ScriptValue::Undefined)
            }
            Operation::Abort => {
                let in_flight = {
                    let inner = self.inner.borrow();
                    inner.sent && inner.ready_state != ReadyState::Done as u16
                };
                if in_flight {
                    reset_response(&mut self.inner.borrow_mut());
                    self.advance(ReadyState::Done);
                }
                let mut inner = self.inner.borrow_mut();
                inner.ready_state = ReadyState::Unsent as u16;
                inner.sent = false;
                Ok(ScriptValue::Undefined)
            }
            Operation::SetRequestHeader => {
                let name = arg_text(args, 0, "name")?;
                let value = arg_text(args, 1, "value")?;
                self.inner.borrow_mut().request_headers.push((name, value));
                Ok(ScriptValue::Undefined)
            }
            Operation::GetResponseHeader => {
                let name = arg_text(args, 0, "name")?;
                let inner = self.inner.borrow();
                Ok(inner
                    .response_headers
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(&name))
                    .map(|(_, v)| ScriptValue::Text(v.clone()))
                    .unwrap_or(ScriptValue::Null))
            }
            Operation::GetAllResponseHeaders => {
                let inner = self.inner.borrow();
                let all: String = inner
                    .response_headers
                    .iter()
                    .map(|(n, v)| format!("{}: {}\r\n", n.to_ascii_lowercase(), v))
                    .collect();
                Ok(ScriptValue::Text(all))
            }
            Operation::OverrideMimeType | Operation::AddEventListener | Operation::SetMethod => {
                Ok(ScriptValue::Undefined)
            }
        }
    }

    fn set_ready_state_hook(&self, hook: Option<ReadyStateHook<Self>>) {
        self.inner.borrow_mut().hook = hook;
    }

    fn text_value(text: &str) -> ScriptValue {
        ScriptValue::text(text)
    }

    fn json_value(value: &serde_json::Value) -> ScriptValue {
        ScriptValue::Json(value.clone())
    }

    fn value_text(value: &ScriptValue) -> Option<String> {
        match value {
            ScriptValue::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}
