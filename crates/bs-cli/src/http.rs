//! Network-backed native request
//!
//! [`HttpRequest`] gives the engine a real transport outside the browser.
//! `send()` performs the request with `reqwest` on a current-thread tokio
//! runtime and then walks the instance through HEADERS_RECEIVED, LOADING
//! and DONE, firing the ready-state hook at each step. Transport failures
//! complete with status 0, as a browser does.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, Method, Url};
use serde_json::Value;

use bs_core::install::RequestFactory;
use bs_core::proxy::{NativeRequest, ReadyStateHook};
use bs_core::relay::{Operation, Property};
use bs_core::types::ReadyState;

/// Error type for requests the page misuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, String),
}

// =============================================================================
// Transport
// =============================================================================

/// Shared client and runtime.
pub struct Transport {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

struct Outgoing {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<String>,
    timeout: Option<Duration>,
}

struct Incoming {
    status: u16,
    status_text: String,
    final_url: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Transport {
    pub fn new() -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
        let client = Client::builder()
            .user_agent(concat!("bs-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self { runtime, client })
    }

    fn execute(&self, outgoing: Outgoing) -> Result<Incoming, reqwest::Error> {
        self.runtime.block_on(fetch(&self.client, outgoing))
    }
}

async fn fetch(client: &Client, outgoing: Outgoing) -> Result<Incoming, reqwest::Error> {
    let mut builder = client.request(outgoing.method, outgoing.url);
    for (name, value) in &outgoing.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = outgoing.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(body) = outgoing.body {
        builder = builder.body(body);
    }

    let response = builder.send().await?;
    let status = response.status();
    let final_url = response.url().to_string();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.text().await?;

    Ok(Incoming {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        final_url,
        headers,
        body,
    })
}

// =============================================================================
// Request
// =============================================================================

#[derive(Default)]
struct HttpState {
    ready_state: u16,
    method: Option<Method>,
    url: Option<Url>,
    sent: bool,
    request_headers: Vec<(String, String)>,
    response_url: String,
    status: u16,
    status_text: String,
    body: String,
    response_headers: Vec<(String, String)>,
    properties: HashMap<Property, Value>,
    hook: Option<ReadyStateHook<HttpRequest>>,
}

/// Shared-handle native request over [`Transport`].
#[derive(Clone)]
pub struct HttpRequest {
    transport: Rc<Transport>,
    inner: Rc<RefCell<HttpState>>,
}

impl HttpRequest {
    pub fn new(transport: Rc<Transport>) -> Self {
        Self {
            transport,
            inner: Rc::new(RefCell::new(HttpState::default())),
        }
    }

    pub fn response_headers(&self) -> Vec<(String, String)> {
        self.inner.borrow().response_headers.clone()
    }

    fn advance(&self, state: ReadyState) {
        self.inner.borrow_mut().ready_state = state as u16;
        let hook = self.inner.borrow().hook.clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    /// False once a hook aborted or reopened the request.
    fn still_at(&self, state: ReadyState) -> bool {
        let inner = self.inner.borrow();
        inner.sent && inner.ready_state == state as u16
    }

    fn response_type(&self) -> String {
        self.inner
            .borrow()
            .properties
            .get(&Property::ResponseType)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    }

    fn send(&self, body: Option<String>) -> Result<(), HttpError> {
        let outgoing = {
            let mut inner = self.inner.borrow_mut();
            if inner.ready_state != ReadyState::Opened as u16 || inner.sent {
                return Err(HttpError::InvalidState("send() before open()"));
            }
            let (Some(method), Some(url)) = (inner.method.clone(), inner.url.clone()) else {
                return Err(HttpError::InvalidState("send() before open()"));
            };
            inner.sent = true;
            let timeout = inner
                .properties
                .get(&Property::Timeout)
                .and_then(Value::as_u64)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis);
            Outgoing {
                method,
                url,
                headers: inner.request_headers.clone(),
                body,
                timeout,
            }
        };

        debug!("{} {}", outgoing.method, outgoing.url);
        match self.transport.execute(outgoing) {
            Ok(incoming) => {
                {
                    let mut inner = self.inner.borrow_mut();
                    inner.response_url = incoming.final_url;
                    inner.status = incoming.status;
                    inner.status_text = incoming.status_text;
                    inner.response_headers = incoming.headers;
                }
                self.advance(ReadyState::HeadersReceived);
                if !self.still_at(ReadyState::HeadersReceived) {
                    return Ok(());
                }
                self.inner.borrow_mut().body = incoming.body;
                self.advance(ReadyState::Loading);
                if !self.still_at(ReadyState::Loading) {
                    return Ok(());
                }
            }
            Err(e) => {
                warn!("Request failed: {}", e);
                reset_response(&mut self.inner.borrow_mut());
            }
        }
        self.advance(ReadyState::Done);
        Ok(())
    }
}

fn reset_response(inner: &mut HttpState) {
    inner.response_url.clear();
    inner.status = 0;
    inner.status_text.clear();
    inner.body.clear();
    inner.response_headers.clear();
}

/// Standard verbs are matched case-insensitively and upper-cased; others
/// are sent as given.
fn normalize_method(verb: &str) -> Result<Method, HttpError> {
    const STANDARD: [&str; 6] = ["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT"];
    let upper = verb.to_ascii_uppercase();
    let verb = if STANDARD.contains(&upper.as_str()) { upper.as_str() } else { verb };
    Method::from_bytes(verb.as_bytes()).map_err(|_| HttpError::InvalidMethod(verb.to_string()))
}

fn arg_text(args: &[Value], index: usize, name: &'static str) -> Result<String, HttpError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(HttpError::MissingArgument(name))
}

impl NativeRequest for HttpRequest {
    type Value = Value;
    type Error = HttpError;

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

    fn response(&self) -> Result<Value, HttpError> {
        let kind = self.response_type();
        let inner = self.inner.borrow();
        match kind.as_str() {
            "" | "text" => Ok(Value::String(inner.body.clone())),
            "json" if inner.ready_state == ReadyState::Done as u16 => {
                Ok(serde_json::from_str(&inner.body).unwrap_or(Value::Null))
            }
            "json" => Ok(Value::Null),
            _ => Err(HttpError::InvalidState("unsupported responseType")),
        }
    }

    fn response_text(&self) -> Result<String, HttpError> {
        match self.response_type().as_str() {
            "" | "text" => Ok(self.inner.borrow().body.clone()),
            _ => Err(HttpError::InvalidState("responseText needs a text responseType")),
        }
    }

    fn get(&self, property: Property) -> Result<Value, HttpError> {
        let inner = self.inner.borrow();
        let stored = inner.properties.get(&property).cloned();
        let value = match property {
            Property::ReadyState => Value::from(inner.ready_state),
            Property::ResponseUrl => Value::String(inner.response_url.clone()),
            Property::ResponseXml => Value::Null,
            Property::Method => inner
                .method
                .as_ref()
                .map_or(Value::Null, |method| Value::String(method.to_string())),
            Property::ResponseType => stored.unwrap_or_else(|| Value::from("")),
            Property::Timeout => stored.unwrap_or_else(|| Value::from(0)),
            Property::WithCredentials => stored.unwrap_or(Value::Bool(false)),
            _ => stored.unwrap_or_default(),
        };
        Ok(value)
    }

    fn set(&self, property: Property, value: Value) -> Result<(), HttpError> {
        let mut inner = self.inner.borrow_mut();
        if property == Property::ResponseType && inner.ready_state >= ReadyState::Loading as u16 {
            return Err(HttpError::InvalidState("responseType is locked while loading"));
        }
        inner.properties.insert(property, value);
        Ok(())
    }

    fn call(&self, operation: Operation, args: &[Value]) -> Result<Value, HttpError> {
        match operation {
            Operation::Open => {
                let verb = arg_text(args, 0, "method")?;
                let url = arg_text(args, 1, "url")?;
                let method = normalize_method(&verb)?;
                let url = Url::parse(&url).map_err(|e| HttpError::InvalidUrl(url.clone(), e.to_string()))?;
                {
                    let mut inner = self.inner.borrow_mut();
                    reset_response(&mut inner);
                    inner.method = Some(method);
                    inner.url = Some(url);
                    inner.sent = false;
                    inner.request_headers.clear();
                }
                self.advance(ReadyState::Opened);
                Ok(Value::Null)
            }
            Operation::Send => {
                let body = args.first().and_then(Value::as_str).map(str::to_string);
                self.send(body)?;
                Ok(Value::Null)
            }
            Operation::Abort => {
                let mut inner = self.inner.borrow_mut();
                reset_response(&mut inner);
                inner.ready_state = ReadyState::Unsent as u16;
                inner.sent = false;
                Ok(Value::Null)
            }
            Operation::SetRequestHeader => {
                let name = arg_text(args, 0, "name")?;
                let value = arg_text(args, 1, "value")?;
                let mut inner = self.inner.borrow_mut();
                if inner.ready_state != ReadyState::Opened as u16 || inner.sent {
                    return Err(HttpError::InvalidState("setRequestHeader() outside OPENED"));
                }
                inner.request_headers.push((name, value));
                Ok(Value::Null)
            }
            Operation::GetResponseHeader => {
                let name = arg_text(args, 0, "name")?;
                let inner = self.inner.borrow();
                Ok(inner
                    .response_headers
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(&name))
                    .map_or(Value::Null, |(_, v)| Value::String(v.clone())))
            }
            Operation::GetAllResponseHeaders => {
                let inner = self.inner.borrow();
                let all: String = inner
                    .response_headers
                    .iter()
                    .map(|(n, v)| format!("{}: {}\r\n", n.to_ascii_lowercase(), v))
                    .collect();
                Ok(Value::String(all))
            }
            Operation::OverrideMimeType | Operation::AddEventListener | Operation::SetMethod => {
                Ok(Value::Null)
            }
        }
    }

    fn set_ready_state_hook(&self, hook: Option<ReadyStateHook<Self>>) {
        self.inner.borrow_mut().hook = hook;
    }

    fn text_value(text: &str) -> Value {
        Value::String(text.to_string())
    }

    fn json_value(value: &Value) -> Value {
        value.clone()
    }

    fn value_text(value: &Value) -> Option<String> {
        value.as_str().map(str::to_string)
    }
}

/// Builds [`HttpRequest`]s and keeps the latest one for inspection.
pub struct HttpFactory {
    transport: Rc<Transport>,
    last: RefCell<Option<HttpRequest>>,
}

impl HttpFactory {
    pub fn new(transport: Rc<Transport>) -> Self {
        Self {
            transport,
            last: RefCell::new(None),
        }
    }

    pub fn last(&self) -> Option<HttpRequest> {
        self.last.borrow().clone()
    }
}

impl RequestFactory for HttpFactory {
    type Request = HttpRequest;

    fn create(&self) -> HttpRequest {
        let request = HttpRequest::new(self.transport.clone());
        *self.last.borrow_mut() = Some(request.clone());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest::new(Rc::new(Transport::new().unwrap()))
    }

    fn open(request: &HttpRequest, verb: &str, url: &str) -> Result<Value, HttpError> {
        request.call(Operation::Open, &[Value::from(verb), Value::from(url)])
    }

    #[test]
    fn test_open_moves_to_opened() {
        let request = request();
        open(&request, "GET", "http://127.0.0.1:9/").unwrap();
        assert_eq!(request.ready_state(), ReadyState::Opened as u16);
        assert_eq!(request.get(Property::Method).unwrap(), Value::from("GET"));

        open(&request, "patch", "http://127.0.0.1:9/").unwrap();
        assert_eq!(request.get(Property::Method).unwrap(), Value::from("patch"));
        open(&request, "post", "http://127.0.0.1:9/").unwrap();
        assert_eq!(request.get(Property::Method).unwrap(), Value::from("POST"));
    }

    #[test]
    fn test_open_rejects_bad_arguments() {
        let request = request();
        assert_eq!(
            open(&request, "GE T", "http://a/"),
            Err(HttpError::InvalidMethod("GE T".to_string()))
        );
        assert!(matches!(open(&request, "GET", "not a url"), Err(HttpError::InvalidUrl(..))));
        assert_eq!(
            request.call(Operation::Open, &[Value::from("GET")]),
            Err(HttpError::MissingArgument("url"))
        );
    }

    #[test]
    fn test_send_requires_open() {
        let request = request();
        assert!(matches!(
            request.call(Operation::Send, &[]),
            Err(HttpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_connection_failure_completes_with_status_zero() {
        let request = request();
        let states = Rc::new(RefCell::new(Vec::new()));
        {
            let states = states.clone();
            request.set_ready_state_hook(Some(Rc::new(move |native: &HttpRequest| {
                states.borrow_mut().push(native.ready_state());
            })));
        }
        // Port 9 (discard) is closed on test hosts.
        open(&request, "GET", "http://127.0.0.1:9/").unwrap();
        request.call(Operation::Send, &[]).unwrap();

        assert_eq!(*states.borrow(), vec![1, 4]);
        assert_eq!(request.status(), 0);
        assert_eq!(request.response_text().unwrap(), "");
    }

    #[test]
    fn test_response_type_json() {
        let request = request();
        request
            .set(Property::ResponseType, Value::from("json"))
            .unwrap();
        assert!(request.response_text().is_err());
        assert_eq!(request.response().unwrap(), Value::Null);
    }
}
