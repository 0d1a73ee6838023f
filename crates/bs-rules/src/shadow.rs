//! Shadowed rule analysis
//!
//! The Rule Set is keyed by URL alone and the later record wins, so an
//! earlier rule with the same URL can never fire, whatever its verb.

use std::collections::HashMap;

use bs_core::types::{Rule, RuleId};

/// A rule that can never match because a later rule owns its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub hidden: RuleId,
    pub by: RuleId,
    pub url: String,
    /// Set when the winning rule answers a different verb.
    pub verb_differs: bool,
}

pub fn find_shadowed(rules: &[Rule]) -> Vec<Shadowed> {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        last.insert(rule.url.as_str(), index);
    }

    rules
        .iter()
        .enumerate()
        .filter_map(|(index, rule)| {
            let winner_index = *last.get(rule.url.as_str())?;
            if winner_index == index {
                return None;
            }
            let winner = &rules[winner_index];
            Some(Shadowed {
                hidden: rule.id,
                by: winner.id,
                url: rule.url.clone(),
                verb_differs: !winner.verb_matches(&rule.verb),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bs_core::types::Outcome;

    fn rule(id: u64, url: &str, verb: &str) -> Rule {
        Rule {
            id: RuleId(id),
            url: url.to_string(),
            verb: verb.to_string(),
            partial_url_match: false,
            outcome: Outcome { status: 500, body: String::new() },
        }
    }

    #[test]
    fn test_no_duplicates() {
        let rules = vec![rule(1, "https://a", "GET"), rule(2, "https://b", "GET")];
        assert!(find_shadowed(&rules).is_empty());
    }

    #[test]
    fn test_later_rule_hides_earlier() {
        let rules = vec![
            rule(1, "https://a", "GET"),
            rule(2, "https://b", "GET"),
            rule(3, "https://a", "POST"),
            rule(4, "https://a", "post"),
        ];
        let shadowed = find_shadowed(&rules);
        assert_eq!(
            shadowed,
            vec![
                Shadowed { hidden: RuleId(1), by: RuleId(4), url: "https://a".to_string(), verb_differs: true },
                Shadowed { hidden: RuleId(3), by: RuleId(4), url: "https://a".to_string(), verb_differs: false },
            ]
        );
    }
}
