//! Bridge
//!
//! Relays the store's two signals (enabled flag, rule list) into install and
//! uninstall calls on the page binding. Installation waits until the page's
//! document exists; until then the bridge asks its [`PageContext`] for an
//! idle callback and retries from there, never in a tight loop.

use log::debug;

use crate::install::{InstallHandle, RequestBinding, RequestFactory};
use crate::snapshot::RuleSet;
use crate::store::{RuleStore, StoreChange};

/// The page the engine runs in.
pub trait PageContext {
    /// Whether the page can host injected script (document head and body exist).
    fn document_ready(&self) -> bool;
    /// Arrange for [`Bridge::on_idle`] to be called at the next idle point.
    fn request_idle(&mut self);
}

/// Where the bridge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Feature disabled; native constructor in place
    Disabled,
    /// Enabled, waiting for the document before installing
    Pending,
    /// Proxy constructor installed
    Installed,
}

/// Serializes install/uninstall in response to store signals.
pub struct Bridge<F: RequestFactory> {
    binding: RequestBinding<F>,
    enabled: bool,
    pending: bool,
    idle_requested: bool,
}

impl<F: RequestFactory> Bridge<F> {
    pub fn new(binding: RequestBinding<F>) -> Self {
        Self {
            binding,
            enabled: false,
            pending: false,
            idle_requested: false,
        }
    }

    pub fn binding(&self) -> &RequestBinding<F> {
        &self.binding
    }

    pub fn state(&self) -> BridgeState {
        if self.binding.is_installed() {
            BridgeState::Installed
        } else if self.pending {
            BridgeState::Pending
        } else {
            BridgeState::Disabled
        }
    }

    /// Page load: if the feature is already enabled, install at the next
    /// idle point.
    pub fn start<S, C>(&mut self, store: &S, ctx: &mut C)
    where
        S: RuleStore + ?Sized,
        C: PageContext + ?Sized,
    {
        self.enabled = store.enabled();
        if self.enabled {
            self.pending = true;
            self.schedule(ctx);
        }
    }

    /// Idle callback: retry a pending installation.
    pub fn on_idle<S, C>(&mut self, store: &S, ctx: &mut C) -> Option<InstallHandle>
    where
        S: RuleStore + ?Sized,
        C: PageContext + ?Sized,
    {
        self.idle_requested = false;
        if !self.pending {
            return None;
        }
        self.prepare(store, ctx)
    }

    /// Store change notification.
    pub fn on_change<S, C>(&mut self, change: &StoreChange, store: &S, ctx: &mut C) -> Option<InstallHandle>
    where
        S: RuleStore + ?Sized,
        C: PageContext + ?Sized,
    {
        if let Some(enabled) = change.enabled {
            self.enabled = enabled;
            if !enabled {
                self.pending = false;
                self.binding.uninstall();
                return None;
            }
        }

        if change.enabled == Some(true) || (change.entries.is_some() && self.enabled) {
            self.binding.uninstall();
            self.pending = true;
            return self.prepare(store, ctx);
        }

        None
    }

    fn prepare<S, C>(&mut self, store: &S, ctx: &mut C) -> Option<InstallHandle>
    where
        S: RuleStore + ?Sized,
        C: PageContext + ?Sized,
    {
        if !ctx.document_ready() {
            debug!("document not ready; deferring install");
            self.schedule(ctx);
            return None;
        }

        self.pending = false;
        let rules = RuleSet::from_entries_value(&store.entries());
        Some(self.binding.install(rules))
    }

    fn schedule<C: PageContext + ?Sized>(&mut self, ctx: &mut C) {
        if !self.idle_requested {
            self.idle_requested = true;
            ctx.request_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::Constructor;
    use crate::store::MemoryStore;
    use crate::testing::ScriptedRequest;
    use crate::types::Variant;
    use serde_json::{json, Value};

    struct Natives;

    impl RequestFactory for Natives {
        type Request = ScriptedRequest;

        fn create(&self) -> ScriptedRequest {
            ScriptedRequest::new()
        }
    }

    #[derive(Default)]
    struct Page {
        ready: bool,
        idle_requests: usize,
    }

    impl PageContext for Page {
        fn document_ready(&self) -> bool {
            self.ready
        }

        fn request_idle(&mut self) {
            self.idle_requests += 1;
        }
    }

    fn bridge() -> Bridge<Natives> {
        Bridge::new(RequestBinding::new(Natives, Variant::CustomResponse))
    }

    fn entries() -> Value {
        json!([{"id": 1, "url": "https://a/b", "verb": "GET", "responseCode": 404}])
    }

    #[test]
    fn test_start_disabled_does_nothing() {
        let store = MemoryStore::new(false, entries());
        let mut page = Page { ready: true, ..Page::default() };
        let mut bridge = bridge();
        bridge.start(&store, &mut page);
        assert_eq!(page.idle_requests, 0);
        assert_eq!(bridge.state(), BridgeState::Disabled);
        assert_eq!(bridge.on_idle(&store, &mut page), None);
    }

    #[test]
    fn test_start_enabled_installs_on_idle() {
        let store = MemoryStore::new(true, entries());
        let mut page = Page { ready: true, ..Page::default() };
        let mut bridge = bridge();
        bridge.start(&store, &mut page);
        assert_eq!(bridge.state(), BridgeState::Pending);
        assert_eq!(page.idle_requests, 1);

        let handle = bridge.on_idle(&store, &mut page).unwrap();
        assert_eq!(handle.rule_count, 1);
        assert_eq!(bridge.state(), BridgeState::Installed);
    }

    #[test]
    fn test_install_waits_for_document() {
        let store = MemoryStore::new(true, entries());
        let mut page = Page::default();
        let mut bridge = bridge();
        bridge.start(&store, &mut page);

        for attempt in 1..=3 {
            assert_eq!(bridge.on_idle(&store, &mut page), None);
            assert_eq!(page.idle_requests, attempt + 1);
            assert_eq!(bridge.state(), BridgeState::Pending);
        }

        page.ready = true;
        assert!(bridge.on_idle(&store, &mut page).is_some());
        assert_eq!(page.idle_requests, 4);
    }

    #[test]
    fn test_disable_uninstalls_and_cancels_pending() {
        let store = MemoryStore::new(true, entries());
        let mut page = Page { ready: true, ..Page::default() };
        let mut bridge = bridge();
        bridge.start(&store, &mut page);
        bridge.on_idle(&store, &mut page);

        bridge.on_change(&StoreChange::enabled(false), &store, &mut page);
        assert_eq!(bridge.binding().constructor(), Constructor::Native);

        // Disabling twice is harmless.
        bridge.on_change(&StoreChange::enabled(false), &store, &mut page);
        assert_eq!(bridge.state(), BridgeState::Disabled);
    }

    #[test]
    fn test_enable_installs_immediately_when_ready() {
        let store = MemoryStore::new(false, entries());
        let mut page = Page { ready: true, ..Page::default() };
        let mut bridge = bridge();
        bridge.start(&store, &mut page);

        let handle = bridge.on_change(&StoreChange::enabled(true), &store, &mut page);
        assert!(handle.is_some());
        assert_eq!(page.idle_requests, 0);
    }

    #[test]
    fn test_entries_change_reinstalls_only_when_enabled() {
        let store = MemoryStore::new(false, entries());
        let mut page = Page { ready: true, ..Page::default() };
        let mut bridge = bridge();
        bridge.start(&store, &mut page);

        assert_eq!(bridge.on_change(&StoreChange::entries(json!([])), &store, &mut page), None);
        assert_eq!(bridge.state(), BridgeState::Disabled);

        let first = bridge.on_change(&StoreChange::enabled(true), &store, &mut page).unwrap();
        store.set_entries(json!([]));
        let second = bridge
            .on_change(&StoreChange::entries(json!([])), &store, &mut page)
            .unwrap();
        assert!(second.generation > first.generation);
        assert_eq!(second.rule_count, 0);
    }

    #[test]
    fn test_stale_idle_callback_after_disable_is_ignored() {
        let store = MemoryStore::new(true, entries());
        let mut page = Page::default();
        let mut bridge = bridge();
        bridge.start(&store, &mut page);
        bridge.on_change(&StoreChange::enabled(false), &store, &mut page);

        page.ready = true;
        assert_eq!(bridge.on_idle(&store, &mut page), None);
        assert_eq!(bridge.state(), BridgeState::Disabled);
    }
}
