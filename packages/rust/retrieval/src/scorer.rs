//! Relevance scoring.
//!
//! Score = number of distinct keywords found as substrings of the snippet's
//! search text, plus every boost rule whose trigger is a keyword and whose
//! substring appears in the text.
//!
//! Matching is plain substring containment, not word-boundary matching:
//! `car` matches inside `cart`. This favors recall; the tests pin it down.

use blockctx_shared::{BoostRule, Snippet};

use crate::analyzer::KeywordSet;

/// Scores snippets against a keyword set using a fixed boost table.
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    boosts: Vec<BoostRule>,
}

impl RelevanceScorer {
    pub fn new(boosts: &[BoostRule]) -> Self {
        let boosts = boosts
            .iter()
            .map(|rule| BoostRule {
                trigger: rule.trigger.trim().to_lowercase(),
                substring: rule.substring.trim().to_lowercase(),
                bonus: rule.bonus,
            })
            .collect();
        Self { boosts }
    }

    pub fn score(&self, snippet: &Snippet, keywords: &KeywordSet) -> u32 {
        self.score_text(&search_text(snippet), keywords)
    }

    /// Score an already-lowercased search text.
    pub fn score_text(&self, text: &str, keywords: &KeywordSet) -> u32 {
        let base = keywords.iter().filter(|k| text.contains(k)).count();
        let base = u32::try_from(base).unwrap_or(u32::MAX);

        self.boosts
            .iter()
            .filter(|rule| keywords.contains(&rule.trigger) && text.contains(&rule.substring))
            .fold(base, |score, rule| score.saturating_add(rule.bonus))
    }
}

/// All snippet fields, lowercased and newline-separated.
pub fn search_text(snippet: &Snippet) -> String {
    let mut fields = vec![
        snippet.concept.as_str(),
        snippet.library_link.as_str(),
        snippet.xml_tag.as_str(),
        snippet.id.as_str(),
    ];
    fields.extend(snippet.required_params.iter().map(String::as_str));
    fields.join("\n").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryAnalyzer;
    use blockctx_shared::RetrievalConfig;
    use proptest::prelude::*;

    fn snippet(name: &str, concept: &str) -> Snippet {
        Snippet {
            concept: concept.into(),
            library_link: format!("TVSM_Library.{name}"),
            xml_tag: "MainLibrary.Serial".into(),
            id: "{0000}".into(),
            required_params: vec!["Value".into()],
        }
    }

    fn default_scorer() -> RelevanceScorer {
        RelevanceScorer::new(&RetrievalConfig::default().boosts)
    }

    fn keywords(words: &[&str]) -> KeywordSet {
        words.iter().copied().collect()
    }

    #[test]
    fn search_text_covers_every_field() {
        let text = search_text(&snippet("SET_IGN_ON", "Set Ign On (Requires: Value)"));
        assert!(text.contains("set ign on"));
        assert!(text.contains("tvsm_library.set_ign_on"));
        assert!(text.contains("mainlibrary.serial"));
        assert!(text.contains("{0000}"));
        assert!(text.ends_with("value"));
    }

    #[test]
    fn base_score_counts_distinct_matches() {
        let s = snippet("SET_BATT_VOLTAGE", "Set Batt Voltage (Requires: Value)");
        let scorer = RelevanceScorer::new(&[]);
        assert_eq!(scorer.score(&s, &keywords(&["batt", "voltage", "gear"])), 2);
        assert_eq!(scorer.score(&s, &keywords(&[])), 0);
    }

    #[test]
    fn boost_needs_trigger_and_substring() {
        let s = snippet("DEACTIVATE_RELEASE_ERROR", "Deactivate Release Error");
        let scorer = default_scorer();
        // "remove" itself does not occur; "deactivate" does, plus the +10 boost.
        assert_eq!(scorer.score(&s, &keywords(&["remove", "deactivate"])), 11);
        // Substring present but trigger absent: no boost.
        assert_eq!(scorer.score(&s, &keywords(&["deactivate"])), 1);
    }

    #[test]
    fn remove_fault_prefers_deactivate_block() {
        let keywords = QueryAnalyzer::new(&RetrievalConfig::default()).analyze("remove fault");
        let scorer = default_scorer();
        let deactivate = scorer.score(
            &snippet("DEACTIVATE_RELEASE_ERROR", "Deactivate Release Error"),
            &keywords,
        );
        let cluster = scorer.score(
            &snippet("CHECK_CLUSTER", "Check Cluster"),
            &keywords,
        );
        assert!(deactivate > cluster, "{deactivate} <= {cluster}");
        assert_eq!(cluster, 0);
    }

    #[test]
    fn boost_table_is_case_insensitive() {
        let scorer = RelevanceScorer::new(&[BoostRule::new(" Gear ", "GEAR", 5)]);
        let s = snippet("WRITE_READ_GEAR", "Write Read Gear");
        assert_eq!(scorer.score(&s, &keywords(&["gear"])), 6);
    }

    #[test]
    fn substring_match_is_not_word_bounded() {
        let s = snippet("MOVE_CART", "Move Cart");
        assert_eq!(RelevanceScorer::new(&[]).score(&s, &keywords(&["car"])), 1);
    }

    proptest! {
        // Any keyword embedded inside a longer word still counts as a match.
        #[test]
        fn embedded_keyword_always_matches(
            prefix in "[a-z]{0,5}",
            word in "[a-z]{3,8}",
            suffix in "[a-z]{0,5}",
        ) {
            let name = format!("{prefix}{word}{suffix}").to_uppercase();
            let s = snippet(&name, &name);
            let score = RelevanceScorer::new(&[]).score(&s, &keywords(&[word.as_str()]));
            prop_assert_eq!(score, 1);
        }

        #[test]
        fn score_is_monotonic_in_keywords(
            base in prop::collection::btree_set("[a-z]{1,6}", 0..6),
            extra in prop::collection::btree_set("[a-z]{1,6}", 0..6),
            concept in "[a-z ]{0,40}",
        ) {
            let s = snippet("GEAR_BATTERY_DEACTIVATE", &concept);
            let scorer = default_scorer();
            let small: KeywordSet = base.iter().map(String::as_str).collect();
            let large: KeywordSet = base.iter().chain(extra.iter()).map(String::as_str).collect();
            prop_assert!(small.is_subset(&large));
            prop_assert!(scorer.score(&s, &large) >= scorer.score(&s, &small));
        }
    }
}
