//! Installer / Uninstaller
//!
//! The page resolves its request constructor through one swappable binding.
//! [`RequestBinding`] owns that binding for the page's lifetime: `install`
//! points it at the proxy constructor (bound to a fresh Rule Set snapshot),
//! `uninstall` points it back at the native constructor and drops the
//! snapshot. Requests already constructed keep whatever they were built with.

use std::rc::Rc;
use std::sync::Arc;

use log::debug;

use crate::matcher::Matcher;
use crate::proxy::{NativeRequest, PageHook, ProxyError, ReadyStateHook, RequestProxy};
use crate::relay::{Operation, Property};
use crate::snapshot::RuleSet;
use crate::types::Variant;

/// Source of native request instances (the original constructor).
pub trait RequestFactory {
    type Request: NativeRequest;

    fn create(&self) -> Self::Request;
}

/// What the page's request constructor currently resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constructor {
    Native,
    Intercepting { generation: u64 },
}

/// Identifies one installation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallHandle {
    pub generation: u64,
    pub rule_count: usize,
}

struct Installation {
    handle: InstallHandle,
    matcher: Arc<Matcher>,
}

/// The page-wide request constructor binding.
pub struct RequestBinding<F: RequestFactory> {
    factory: F,
    variant: Variant,
    active: Option<Installation>,
    generation: u64,
}

impl<F: RequestFactory> RequestBinding<F> {
    /// A binding that resolves to the native constructor.
    pub fn new(factory: F, variant: Variant) -> Self {
        Self {
            factory,
            variant,
            active: None,
            generation: 0,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn is_installed(&self) -> bool {
        self.active.is_some()
    }

    pub fn constructor(&self) -> Constructor {
        match &self.active {
            Some(installation) => Constructor::Intercepting {
                generation: installation.handle.generation,
            },
            None => Constructor::Native,
        }
    }

    /// The snapshot in effect, if installed.
    pub fn matcher(&self) -> Option<&Arc<Matcher>> {
        self.active.as_ref().map(|installation| &installation.matcher)
    }

    /// Swap the proxy constructor in with `rules` as its snapshot. Any
    /// previous installation is fully removed first.
    pub fn install(&mut self, rules: RuleSet) -> InstallHandle {
        self.uninstall();

        self.generation += 1;
        let handle = InstallHandle {
            generation: self.generation,
            rule_count: rules.len(),
        };
        let matcher = Arc::new(Matcher::new(Arc::new(rules), self.variant));
        self.active = Some(Installation { handle, matcher });

        debug!(
            "installed request proxy (generation {}, {} rules, {})",
            handle.generation, handle.rule_count, self.variant
        );
        handle
    }

    /// Restore the native constructor. A no-op when not installed.
    pub fn uninstall(&mut self) -> Option<InstallHandle> {
        let installation = self.active.take()?;
        debug!(
            "uninstalled request proxy (generation {})",
            installation.handle.generation
        );
        Some(installation.handle)
    }

    /// Uninstall only if `handle` is still the active installation.
    pub fn uninstall_handle(&mut self, handle: InstallHandle) -> bool {
        match &self.active {
            Some(installation) if installation.handle == handle => self.uninstall().is_some(),
            _ => false,
        }
    }

    /// `new Request()` as the page sees it.
    pub fn construct(&self) -> PageRequest<F::Request> {
        let actual = self.factory.create();
        match &self.active {
            Some(installation) => {
                PageRequest::Intercepted(RequestProxy::new(actual, installation.matcher.clone()))
            }
            None => PageRequest::Native(actual),
        }
    }
}

// =============================================================================
// Page Request
// =============================================================================

/// A request object handed to page code: native or proxied, same surface.
pub enum PageRequest<N: NativeRequest> {
    Native(N),
    Intercepted(RequestProxy<N>),
}

impl<N: NativeRequest> PageRequest<N> {
    pub fn is_intercepted(&self) -> bool {
        matches!(self, Self::Intercepted(_))
    }

    /// The native instance behind this request.
    pub fn actual(&self) -> &N {
        match self {
            Self::Native(actual) => actual,
            Self::Intercepted(proxy) => proxy.actual(),
        }
    }

    pub fn ready_state(&self) -> u16 {
        match self {
            Self::Native(actual) => actual.ready_state(),
            Self::Intercepted(proxy) => proxy.ready_state(),
        }
    }

    pub fn response_url(&self) -> String {
        match self {
            Self::Native(actual) => actual.response_url(),
            Self::Intercepted(proxy) => proxy.response_url(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Native(actual) => actual.status(),
            Self::Intercepted(proxy) => proxy.status(),
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            Self::Native(actual) => actual.status_text(),
            Self::Intercepted(proxy) => proxy.status_text(),
        }
    }

    pub fn response(&self) -> Result<N::Value, N::Error> {
        match self {
            Self::Native(actual) => actual.response(),
            Self::Intercepted(proxy) => proxy.response(),
        }
    }

    pub fn response_text(&self) -> Result<String, N::Error> {
        match self {
            Self::Native(actual) => actual.response_text(),
            Self::Intercepted(proxy) => proxy.response_text(),
        }
    }

    pub fn get(&self, property: Property) -> Result<N::Value, ProxyError<N::Error>> {
        match self {
            Self::Native(actual) => actual.get(property).map_err(ProxyError::Native),
            Self::Intercepted(proxy) => proxy.get(property),
        }
    }

    pub fn set(&self, property: Property, value: N::Value) -> Result<(), ProxyError<N::Error>> {
        match self {
            Self::Native(actual) => {
                if !property.is_writable() {
                    return Err(ProxyError::ReadOnly(property.name()));
                }
                actual.set(property, value).map_err(ProxyError::Native)
            }
            Self::Intercepted(proxy) => proxy.set(property, value),
        }
    }

    pub fn call(&self, operation: Operation, args: &[N::Value]) -> Result<N::Value, ProxyError<N::Error>> {
        match self {
            Self::Native(actual) => actual.call(operation, args).map_err(ProxyError::Native),
            Self::Intercepted(proxy) => proxy.call(operation, args),
        }
    }

    pub fn set_on_ready_state_change(&self, hook: Option<PageHook>) {
        match self {
            Self::Native(actual) => {
                let hook = hook.map(|hook| Rc::new(move |_: &N| hook()) as ReadyStateHook<N>);
                actual.set_ready_state_hook(hook);
            }
            Self::Intercepted(proxy) => proxy.set_on_ready_state_change(hook),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptValue, ScriptedRequest, ScriptedResponse};
    use std::cell::RefCell;

    /// Factory that remembers every native instance it hands out.
    #[derive(Default)]
    struct Recorder {
        created: RefCell<Vec<ScriptedRequest>>,
    }

    impl RequestFactory for Rc<Recorder> {
        type Request = ScriptedRequest;

        fn create(&self) -> ScriptedRequest {
            let request = ScriptedRequest::new();
            self.created.borrow_mut().push(request.clone());
            request
        }
    }

    impl Recorder {
        fn last(&self) -> ScriptedRequest {
            self.created.borrow().last().cloned().unwrap()
        }
    }

    const ENTRIES: &str = r#"[{"id": 1, "url": "https://a/b", "verb": "GET",
        "responseCode": 404, "responseValue": "gone"}]"#;

    fn issue(request: &PageRequest<ScriptedRequest>, url: &str) {
        request
            .call(Operation::Open, &[ScriptValue::text("GET"), ScriptValue::text(url)])
            .unwrap();
        request.call(Operation::Send, &[]).unwrap();
    }

    #[test]
    fn test_uninstall_when_not_installed_is_noop() {
        let mut binding = RequestBinding::new(Rc::new(Recorder::default()), Variant::CustomResponse);
        assert_eq!(binding.uninstall(), None);
        assert_eq!(binding.uninstall(), None);
        assert_eq!(binding.constructor(), Constructor::Native);
    }

    #[test]
    fn test_install_then_uninstall_restores_native() {
        let recorder = Rc::new(Recorder::default());
        let mut binding = RequestBinding::new(recorder.clone(), Variant::CustomResponse);

        let handle = binding.install(RuleSet::from_json(ENTRIES));
        assert_eq!(handle.rule_count, 1);
        assert_eq!(binding.constructor(), Constructor::Intercepting { generation: 1 });
        assert!(binding.construct().is_intercepted());

        assert_eq!(binding.uninstall(), Some(handle));
        assert_eq!(binding.constructor(), Constructor::Native);
        assert!(binding.matcher().is_none());

        let request = binding.construct();
        assert!(!request.is_intercepted());
        issue(&request, "https://a/b");
        recorder.last().respond(ScriptedResponse::ok("native"));
        assert_eq!(request.status(), 200);
        assert_eq!(request.response_text().unwrap(), "native");
    }

    #[test]
    fn test_reinstall_replaces_previous_installation() {
        let mut binding = RequestBinding::new(Rc::new(Recorder::default()), Variant::CustomResponse);
        let first = binding.install(RuleSet::empty());
        let second = binding.install(RuleSet::from_json(ENTRIES));
        assert_ne!(first, second);
        assert!(!binding.uninstall_handle(first));
        assert!(binding.is_installed());
        assert!(binding.uninstall_handle(second));
        assert!(!binding.is_installed());
    }

    #[test]
    fn test_native_page_request_forwards_hook() {
        let recorder = Rc::new(Recorder::default());
        let binding = RequestBinding::new(recorder.clone(), Variant::CustomResponse);
        let request = binding.construct();

        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        request.set_on_ready_state_change(Some(Rc::new(move || *counter.borrow_mut() += 1)));
        issue(&request, "https://a/b");
        recorder.last().respond(ScriptedResponse::ok("x"));
        assert_eq!(*fired.borrow(), 4);
    }

    #[test]
    fn test_read_only_set_is_refused_in_both_modes() {
        let mut binding = RequestBinding::new(Rc::new(Recorder::default()), Variant::CustomResponse);
        let native = binding.construct();
        binding.install(RuleSet::empty());
        let proxied = binding.construct();

        for request in [&native, &proxied] {
            assert_eq!(
                request.set(Property::Upload, ScriptValue::Null),
                Err(ProxyError::ReadOnly("upload"))
            );
        }
    }
}
