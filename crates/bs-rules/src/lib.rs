//! Backend Simulator Rule List
//!
//! This crate is the editing side of the rule store: it validates rule
//! drafts, assigns ids, keeps the ordered rule list, reports dead
//! (shadowed) rules and reads/writes the store document.

pub mod document;
pub mod draft;
pub mod list;
pub mod shadow;

pub use document::StoreDocument;
pub use draft::RuleDraft;
pub use list::{decode_entries, InvalidEntry, RuleList};
pub use shadow::{find_shadowed, Shadowed};

/// Error type for rule validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("Invalid HTTP verb: '{0}'")]
    InvalidVerb(String),
    #[error("Invalid status code '{0}': expected an integer between 0 and {1}")]
    InvalidStatusCode(String, u16),
    #[error("Prefix rule URL must not contain a query string: {0}")]
    PrefixWithQuery(String),
}

/// Error type for store document I/O.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
