//! Core Matching Engine
//!
//! Every completed request goes through here. The lookup order is fixed:
//! exact URL first, then the query-less prefix (when the variant allows it).
//! Only one candidate is considered at each step.

use std::sync::Arc;

use log::debug;

use crate::snapshot::RuleSet;
use crate::types::{Rule, Substitution, Variant};
use crate::url::strip_query;

// =============================================================================
// Matcher
// =============================================================================

/// Resolves a request's URL and verb to at most one rule of a frozen snapshot.
#[derive(Debug, Clone)]
pub struct Matcher {
    rules: Arc<RuleSet>,
    variant: Variant,
}

/// How a rule was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Full URL (query included) and verb matched
    Exact,
    /// Query-less URL and verb matched a prefix rule
    Partial,
}

/// Result of a successful match.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub kind: MatchKind,
}

impl<'a> RuleMatch<'a> {
    /// The substitution this match produces under `variant`.
    pub fn substitution(&self, variant: Variant) -> Substitution {
        Substitution::for_rule(self.rule, variant)
    }
}

impl Matcher {
    /// Create a new matcher over the given snapshot.
    pub fn new(rules: Arc<RuleSet>, variant: Variant) -> Self {
        Self { rules, variant }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Match a completed request and return the applicable rule, if any.
    pub fn match_request(&self, resolved_url: &str, verb: &str) -> Option<RuleMatch<'_>> {
        let found = match_rule(&self.rules, self.variant, resolved_url, verb);
        match &found {
            Some(m) => debug!(
                "{} {} matched rule {} ({:?})",
                verb, resolved_url, m.rule.id, m.kind
            ),
            None => debug!("{} {} passed through", verb, resolved_url),
        }
        found
    }

    /// Substitution for a completed request, if a rule matches.
    pub fn substitution_for(&self, resolved_url: &str, verb: &str) -> Option<Substitution> {
        self.match_request(resolved_url, verb)
            .map(|m| m.substitution(self.variant))
    }
}

/// Pure lookup: exact full-URL+verb, then (if the variant supports it) the
/// query-stripped URL against a rule flagged for partial matching.
pub fn match_rule<'a>(
    rules: &'a RuleSet,
    variant: Variant,
    resolved_url: &str,
    verb: &str,
) -> Option<RuleMatch<'a>> {
    if resolved_url.is_empty() {
        return None;
    }

    // Step 1: exact
    if let Some(rule) = rules.get(resolved_url) {
        if rule.verb_matches(verb) {
            return Some(RuleMatch { rule, kind: MatchKind::Exact });
        }
    }

    // Step 2: prefix
    if !variant.supports_partial_match() {
        return None;
    }
    let base = strip_query(resolved_url)?;
    let rule = rules.get(base)?;
    if rule.verb_matches(verb) && rule.partial_url_match {
        return Some(RuleMatch { rule, kind: MatchKind::Partial });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, RuleId};

    fn rule(id: u64, url: &str, verb: &str, partial: bool, status: u16) -> Rule {
        Rule {
            id: RuleId(id),
            url: url.to_string(),
            verb: verb.to_string(),
            partial_url_match: partial,
            outcome: Outcome { status, body: format!("body-{}", id) },
        }
    }

    fn matcher(rules: Vec<Rule>, variant: Variant) -> Matcher {
        Matcher::new(Arc::new(RuleSet::from_rules(rules)), variant)
    }

    #[test]
    fn test_exact_match() {
        let m = matcher(vec![rule(1, "https://a/b", "GET", false, 404)], Variant::CustomResponse);
        let found = m.match_request("https://a/b", "GET").unwrap();
        assert_eq!(found.rule.id, RuleId(1));
        assert_eq!(found.kind, MatchKind::Exact);
        assert!(m.match_request("https://a/b?x=1", "GET").is_none());
        assert!(m.match_request("https://a/b", "POST").is_none());
    }

    #[test]
    fn test_verb_case_insensitive() {
        let m = matcher(vec![rule(1, "https://a/b", "post", false, 500)], Variant::CustomResponse);
        assert!(m.match_request("https://a/b", "POST").is_some());
    }

    #[test]
    fn test_query_string_stripping_scope() {
        let m = matcher(vec![rule(1, "https://api.x/y", "GET", true, 404)], Variant::CustomResponse);
        let found = m.match_request("https://api.x/y?a=1&b=2", "GET").unwrap();
        assert_eq!(found.kind, MatchKind::Partial);
        assert!(m.match_request("https://api.x/y2", "GET").is_none());
        assert!(m.match_request("https://api.x/y2?a=1", "GET").is_none());
    }

    #[test]
    fn test_exact_rule_takes_precedence_over_prefix_rule() {
        let m = matcher(
            vec![
                rule(1, "https://api.x/y?q=1", "POST", false, 400),
                rule(2, "https://api.x/y", "GET", true, 404),
            ],
            Variant::CustomResponse,
        );

        // Exact rule verb differs: fall through to the prefix rule.
        let found = m.match_request("https://api.x/y?q=1", "GET").unwrap();
        assert_eq!(found.rule.id, RuleId(2));

        let found = m.match_request("https://api.x/y?q=1", "POST").unwrap();
        assert_eq!(found.rule.id, RuleId(1));
        assert_eq!(found.kind, MatchKind::Exact);
    }

    #[test]
    fn test_prefix_requires_flag() {
        let m = matcher(vec![rule(1, "https://api.x/y", "GET", false, 404)], Variant::CustomResponse);
        assert!(m.match_request("https://api.x/y?q=1", "GET").is_none());
    }

    #[test]
    fn test_error_code_variant_skips_prefix_step() {
        let m = matcher(vec![rule(1, "https://api.x/y", "GET", true, 500)], Variant::ErrorCode);
        assert!(m.match_request("https://api.x/y?q=1", "GET").is_none());
        assert!(m.match_request("https://api.x/y", "GET").is_some());
    }

    #[test]
    fn test_empty_rule_set_and_url() {
        let m = matcher(Vec::new(), Variant::CustomResponse);
        assert!(m.match_request("https://a/b", "GET").is_none());
        assert!(m.match_request("", "GET").is_none());
    }

    #[test]
    fn test_substitution_for() {
        let m = matcher(vec![rule(7, "https://a/c", "POST", false, 500)], Variant::ErrorCode);
        let sub = m.substitution_for("https://a/c", "post").unwrap();
        assert_eq!(sub.status, 500);
        assert!(sub.status_text.is_some());
    }
}
