//! Rule Set snapshot
//!
//! This module provides the stored record format and the loader that turns
//! the store's `entries` list into an immutable lookup table.

mod loader;
mod record;

pub use loader::*;
pub use record::*;
