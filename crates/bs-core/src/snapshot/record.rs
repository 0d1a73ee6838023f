//! Stored rule record format
//!
//! Records come from the external rule store as loosely-typed JSON: ids and
//! status codes may be numbers or numeric strings, and the outcome fields use
//! either the `errorCode`/`errorResponse` or the `responseCode`/`responseValue`
//! spelling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Outcome, Rule, RuleId};

/// Highest status code a rule may force.
pub const MAX_STATUS_CODE: u16 = 999;

/// Error type for record decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(String),
    #[error("Invalid rule id: {0}")]
    InvalidId(String),
}

/// One entry of the stored `entries` list, as written by the editing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial_url_match: bool,
    #[serde(default, alias = "responseCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<Value>,
    #[serde(default, alias = "responseValue", skip_serializing_if = "Option::is_none")]
    pub error_response: Option<String>,
}

impl RuleRecord {
    /// Decode into a [`Rule`].
    pub fn to_rule(&self) -> Result<Rule, RecordError> {
        let url = self
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(RecordError::MissingField("url"))?;
        let verb = self
            .verb
            .as_deref()
            .filter(|verb| !verb.is_empty())
            .ok_or(RecordError::MissingField("verb"))?;
        let code = self
            .error_code
            .as_ref()
            .ok_or(RecordError::MissingField("errorCode"))?;
        let status = parse_status_code(code)
            .ok_or_else(|| RecordError::InvalidStatusCode(display_value(code)))?;
        let id = match &self.id {
            Some(value) => parse_id(value).ok_or_else(|| RecordError::InvalidId(display_value(value)))?,
            None => RuleId(0),
        };

        Ok(Rule {
            id,
            url: url.to_string(),
            verb: verb.to_string(),
            partial_url_match: self.partial_url_match,
            outcome: Outcome {
                status,
                body: self.error_response.clone().unwrap_or_default(),
            },
        })
    }
}

impl From<&Rule> for RuleRecord {
    fn from(rule: &Rule) -> Self {
        Self {
            id: Some(Value::from(rule.id.0)),
            url: Some(rule.url.clone()),
            verb: Some(rule.verb.clone()),
            partial_url_match: rule.partial_url_match,
            error_code: Some(Value::from(rule.outcome.status)),
            error_response: Some(rule.outcome.body.clone()),
        }
    }
}

/// Coerce a stored status code to an integer in `0..=MAX_STATUS_CODE`.
///
/// Accepts JSON integers (including integral floats) and trimmed decimal
/// strings. Everything else, the empty string included, is rejected.
pub fn parse_status_code(value: &Value) -> Option<u16> {
    let code = match value {
        Value::Number(number) => match number.as_u64() {
            Some(code) => code,
            None => {
                let float = number.as_f64()?;
                if float.fract() != 0.0 || float < 0.0 {
                    return None;
                }
                float as u64
            }
        },
        Value::String(text) => text.trim().parse::<u64>().ok()?,
        _ => return None,
    };

    u16::try_from(code).ok().filter(|code| *code <= MAX_STATUS_CODE)
}

/// Coerce a stored id (number or numeric string).
pub fn parse_id(value: &Value) -> Option<RuleId> {
    match value {
        Value::Number(number) => number.as_u64().map(RuleId),
        Value::String(text) => text.trim().parse::<u64>().ok().map(RuleId),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => format!("'{}'", text),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RuleRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_status_code() {
        assert_eq!(parse_status_code(&json!(404)), Some(404));
        assert_eq!(parse_status_code(&json!("500")), Some(500));
        assert_eq!(parse_status_code(&json!(" 503 ")), Some(503));
        assert_eq!(parse_status_code(&json!(404.0)), Some(404));
        assert_eq!(parse_status_code(&json!(0)), Some(0));
        assert_eq!(parse_status_code(&json!("")), None);
        assert_eq!(parse_status_code(&json!("abc")), None);
        assert_eq!(parse_status_code(&json!(404.5)), None);
        assert_eq!(parse_status_code(&json!(-1)), None);
        assert_eq!(parse_status_code(&json!(1000)), None);
        assert_eq!(parse_status_code(&json!(null)), None);
    }

    #[test]
    fn test_custom_response_spelling() {
        let rule = record(json!({
            "id": 1700000000000u64,
            "url": "https://a/b",
            "verb": "GET",
            "responseCode": 404,
            "responseValue": "{\"e\":1}"
        }))
        .to_rule()
        .unwrap();

        assert_eq!(rule.id, RuleId(1700000000000));
        assert_eq!(rule.outcome.status, 404);
        assert_eq!(rule.outcome.body, "{\"e\":1}");
        assert!(!rule.partial_url_match);
    }

    #[test]
    fn test_error_code_spelling_with_string_fields() {
        let rule = record(json!({
            "id": "17",
            "url": "https://a/c",
            "verb": "post",
            "errorCode": "500",
            "partialUrlMatch": true
        }))
        .to_rule()
        .unwrap();

        assert_eq!(rule.id, RuleId(17));
        assert_eq!(rule.verb, "post");
        assert_eq!(rule.outcome.status, 500);
        assert_eq!(rule.outcome.body, "");
        assert!(rule.partial_url_match);
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let missing_url = record(json!({"verb": "GET", "errorCode": 500}));
        assert_eq!(missing_url.to_rule(), Err(RecordError::MissingField("url")));

        let missing_code = record(json!({"url": "https://a", "verb": "GET"}));
        assert_eq!(missing_code.to_rule(), Err(RecordError::MissingField("errorCode")));

        let bad_code = record(json!({"url": "https://a", "verb": "GET", "errorCode": "oops"}));
        assert_eq!(
            bad_code.to_rule(),
            Err(RecordError::InvalidStatusCode("'oops'".to_string()))
        );
    }

    #[test]
    fn test_record_from_rule_uses_error_code_spelling() {
        let rule = record(json!({"id": 3, "url": "https://a", "verb": "GET", "errorCode": 418}))
            .to_rule()
            .unwrap();
        let value = serde_json::to_value(RuleRecord::from(&rule)).unwrap();
        assert_eq!(value["errorCode"], json!(418));
        assert_eq!(value["id"], json!(3));
        assert!(value.get("partialUrlMatch").is_none());
    }
}
