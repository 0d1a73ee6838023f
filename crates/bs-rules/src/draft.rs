//! Rule drafts and save-time validation
//!
//! A draft is what the editing surface submits: free-form strings straight
//! from its inputs. Validation turns it into a [`Rule`] or refuses it.

use serde_json::Value;

use bs_core::snapshot::{parse_status_code, MAX_STATUS_CODE};
use bs_core::types::{Outcome, Rule, RuleId};

use crate::RuleError;

/// Unvalidated rule fields as entered by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDraft {
    pub url: String,
    pub verb: String,
    /// Status code as typed (`"404"`)
    pub code: String,
    pub body: String,
    pub partial_url_match: bool,
}

impl RuleDraft {
    pub fn new(url: &str, verb: &str, code: &str) -> Self {
        Self {
            url: url.to_string(),
            verb: verb.to_string(),
            code: code.to_string(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_partial_url_match(mut self, partial: bool) -> Self {
        self.partial_url_match = partial;
        self
    }

    /// Validate and assign `id`. The verb is stored upper-cased.
    pub fn validate(&self, id: RuleId) -> Result<Rule, RuleError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(RuleError::EmptyField("url"));
        }
        if self.partial_url_match && url.contains('?') {
            return Err(RuleError::PrefixWithQuery(url.to_string()));
        }

        let verb = self.verb.trim();
        if verb.is_empty() {
            return Err(RuleError::EmptyField("verb"));
        }
        if !verb.bytes().all(is_token_byte) {
            return Err(RuleError::InvalidVerb(verb.to_string()));
        }

        let status = parse_status_code(&Value::String(self.code.clone()))
            .ok_or_else(|| RuleError::InvalidStatusCode(self.code.clone(), MAX_STATUS_CODE))?;

        Ok(Rule {
            id,
            url: url.to_string(),
            verb: verb.to_ascii_uppercase(),
            partial_url_match: self.partial_url_match,
            outcome: Outcome {
                status,
                body: self.body.clone(),
            },
        })
    }
}

impl From<&Rule> for RuleDraft {
    fn from(rule: &Rule) -> Self {
        Self {
            url: rule.url.clone(),
            verb: rule.verb.clone(),
            code: rule.outcome.status.to_string(),
            body: rule.outcome.body.clone(),
            partial_url_match: rule.partial_url_match,
        }
    }
}

/// RFC 9110 token characters (HTTP method names).
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_normalizes() {
        let rule = RuleDraft::new(" https://a/b ", "post", " 500 ")
            .with_body("oops")
            .validate(RuleId(9))
            .unwrap();
        assert_eq!(rule.id, RuleId(9));
        assert_eq!(rule.url, "https://a/b");
        assert_eq!(rule.verb, "POST");
        assert_eq!(rule.outcome, Outcome { status: 500, body: "oops".to_string() });
    }

    #[test]
    fn test_rejects_non_numeric_code() {
        for code in ["", "abc", "5xx", "-1", "1000", "404.5"] {
            let err = RuleDraft::new("https://a", "GET", code).validate(RuleId(1)).unwrap_err();
            assert!(matches!(err, RuleError::InvalidStatusCode(..)), "{code:?} accepted");
        }
    }

    #[test]
    fn test_rejects_empty_fields_and_bad_verbs() {
        assert_eq!(
            RuleDraft::new("", "GET", "500").validate(RuleId(1)),
            Err(RuleError::EmptyField("url"))
        );
        assert_eq!(
            RuleDraft::new("https://a", " ", "500").validate(RuleId(1)),
            Err(RuleError::EmptyField("verb"))
        );
        assert_eq!(
            RuleDraft::new("https://a", "GE T", "500").validate(RuleId(1)),
            Err(RuleError::InvalidVerb("GE T".to_string()))
        );
    }

    #[test]
    fn test_prefix_rule_cannot_carry_query() {
        let draft = RuleDraft::new("https://a/b?x=1", "GET", "404").with_partial_url_match(true);
        assert_eq!(
            draft.validate(RuleId(1)),
            Err(RuleError::PrefixWithQuery("https://a/b?x=1".to_string()))
        );
    }
}
