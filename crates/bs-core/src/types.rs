//! Core type definitions for Backend Simulator
//!
//! These types are shared by the snapshot loader, the matcher and the
//! request proxy. Stored records are decoded into them by `snapshot::record`.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Variant
// =============================================================================

/// Which substitution a deployment applies to matched requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Caller-specified status and literal body ("simulate custom response")
    #[default]
    CustomResponse,
    /// Forced status with a fixed error body ("simulate error code")
    ErrorCode,
}

impl Variant {
    /// Whether rules may match a request URL that differs only by query string.
    pub const fn supports_partial_match(self) -> bool {
        matches!(self, Self::CustomResponse)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CustomResponse => "custom-response",
            Self::ErrorCode => "error-code",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom-response" | "custom" => Ok(Self::CustomResponse),
            "error-code" | "error" => Ok(Self::ErrorCode),
            other => Err(format!("unknown variant '{}'", other)),
        }
    }
}

// =============================================================================
// Rule
// =============================================================================

/// Opaque rule identifier, assigned once at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a matched request is turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// HTTP status forced onto the request
    pub status: u16,
    /// Literal response body (ignored by the error-code variant)
    pub body: String,
}

/// A user-authored mapping from (URL, verb) to a substituted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    /// Exact URL, or the query-less prefix when `partial_url_match` is set
    pub url: String,
    pub verb: String,
    pub partial_url_match: bool,
    pub outcome: Outcome,
}

impl Rule {
    /// Case-insensitive verb comparison.
    #[inline]
    pub fn verb_matches(&self, verb: &str) -> bool {
        self.verb.eq_ignore_ascii_case(verb)
    }
}

// =============================================================================
// Ready State
// =============================================================================

/// Lifecycle position of a native request (`readyState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl TryFrom<u16> for ReadyState {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unsent),
            1 => Ok(Self::Opened),
            2 => Ok(Self::HeadersReceived),
            3 => Ok(Self::Loading),
            4 => Ok(Self::Done),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Substitution
// =============================================================================

/// Status text reported by the error-code variant.
pub const ERROR_STATUS_TEXT: &str = "Error thrown by Backend Simulator Chrome Extension";

/// Body reported by the error-code variant (`responseText`).
pub const ERROR_BODY: &str = r#"{"error":true}"#;

/// Body of a substituted response.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstitutedBody {
    /// `response` and `responseText` both carry this string
    Text(String),
    /// `response` carries the JSON value, `responseText` its serialization
    Json(serde_json::Value),
}

impl SubstitutedBody {
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }
}

/// Observable fields forced onto a matched request.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub status: u16,
    /// `None` keeps the native status text
    pub status_text: Option<String>,
    pub body: SubstitutedBody,
}

impl Substitution {
    /// Build the substitution `variant` applies for `rule`.
    pub fn for_rule(rule: &Rule, variant: Variant) -> Self {
        match variant {
            Variant::ErrorCode => Self {
                status: rule.outcome.status,
                status_text: Some(ERROR_STATUS_TEXT.to_string()),
                body: SubstitutedBody::Json(serde_json::json!({ "error": true })),
            },
            Variant::CustomResponse => Self {
                status: rule.outcome.status,
                status_text: None,
                body: SubstitutedBody::Text(rule.outcome.body.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(verb: &str) -> Rule {
        Rule {
            id: RuleId(1),
            url: "https://a/c".to_string(),
            verb: verb.to_string(),
            partial_url_match: false,
            outcome: Outcome { status: 500, body: "ignored".to_string() },
        }
    }

    #[test]
    fn test_verb_matches_ignores_case() {
        assert!(rule("post").verb_matches("POST"));
        assert!(rule("Get").verb_matches("gEt"));
        assert!(!rule("GET").verb_matches("POST"));
    }

    #[test]
    fn test_error_code_substitution() {
        let sub = Substitution::for_rule(&rule("POST"), Variant::ErrorCode);
        assert_eq!(sub.status, 500);
        assert_eq!(sub.status_text.as_deref(), Some(ERROR_STATUS_TEXT));
        assert_eq!(sub.body.text(), ERROR_BODY);
    }

    #[test]
    fn test_custom_substitution_keeps_literal_body() {
        let sub = Substitution::for_rule(&rule("POST"), Variant::CustomResponse);
        assert_eq!(sub.status_text, None);
        assert_eq!(sub.body, SubstitutedBody::Text("ignored".to_string()));
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("error-code".parse::<Variant>(), Ok(Variant::ErrorCode));
        assert_eq!("custom-response".parse::<Variant>(), Ok(Variant::CustomResponse));
        assert!("other".parse::<Variant>().is_err());
        assert!(!Variant::ErrorCode.supports_partial_match());
    }

    #[test]
    fn test_ready_state_from_u16() {
        assert_eq!(ReadyState::try_from(4), Ok(ReadyState::Done));
        assert!(ReadyState::try_from(5).is_err());
    }
}
