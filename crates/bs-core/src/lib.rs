//! Backend Simulator Core Library
//!
//! This crate provides the request interception and response substitution
//! engine for Backend Simulator. It stands in for a page's native request
//! primitive, matches completed requests against a user-defined rule set,
//! and rewrites status and body for matched requests while every other
//! request behaves exactly as native.
//!
//! # Architecture
//!
//! The store's rule list is loaded into an immutable [`RuleSet`] snapshot on
//! every installation. A [`RequestBinding`] owns the page's request
//! constructor; while installed it hands out [`RequestProxy`] instances bound
//! to that snapshot. The [`Bridge`] turns store notifications into
//! install/uninstall calls.
//!
//! # Modules
//!
//! - `types`: Rules, variants, ready states and substitutions
//! - `url`: Query-string handling for prefix matching
//! - `snapshot`: Stored record format and Rule Set loader
//! - `matcher`: Exact-then-prefix rule lookup
//! - `relay`: Capability table of the relayed request surface
//! - `proxy`: Native request trait and the request proxy
//! - `install`: Swappable page request constructor
//! - `store`: Rule store interface and change notifications
//! - `bridge`: Store signals to install/uninstall
//! - `testing`: Scripted native request driven by the caller (tests and the
//!   `testing` feature only)

pub mod bridge;
pub mod install;
pub mod matcher;
pub mod proxy;
pub mod relay;
pub mod snapshot;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeState, PageContext};
pub use install::{Constructor, InstallHandle, PageRequest, RequestBinding, RequestFactory};
pub use matcher::{match_rule, MatchKind, Matcher, RuleMatch};
pub use proxy::{NativeRequest, PageHook, ProxyError, ReadyStateHook, RequestProxy};
pub use relay::{Access, Capability, Operation, Property, CAPABILITIES};
pub use snapshot::{RecordError, RuleRecord, RuleSet};
pub use store::{MemoryStore, RuleStore, StoreChange};
pub use types::{Outcome, ReadyState, Rule, RuleId, Substitution, SubstitutedBody, Variant};
