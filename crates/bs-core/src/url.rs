//! URL helpers for the match path
//!
//! These functions avoid allocations and work directly on string slices.

/// Strip the query string, returning the part before the first `?`.
/// Returns `None` when the URL carries no query string.
#[inline]
pub fn strip_query(url: &str) -> Option<&str> {
    url.find('?').map(|pos| &url[..pos])
}
