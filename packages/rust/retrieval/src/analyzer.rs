//! Query analysis: tokenize, drop noise, expand synonyms one level deep.

use std::collections::{BTreeSet, HashMap, HashSet};

use blockctx_shared::RetrievalConfig;

/// The expanded keyword set for one request. Fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet(BTreeSet<String>);

impl KeywordSet {
    pub fn contains(&self, keyword: &str) -> bool {
        self.0.contains(keyword)
    }

    /// Keywords in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_subset(&self, other: &KeywordSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl<S: Into<String>> FromIterator<S> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::<String>::into)
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }
}

/// Turns free text into a [`KeywordSet`] using the configured tables.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    min_token_len: usize,
    stop_words: HashSet<String>,
    synonyms: HashMap<String, Vec<String>>,
}

impl QueryAnalyzer {
    pub fn new(config: &RetrievalConfig) -> Self {
        let stop_words = config
            .stop_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .collect();
        let synonyms = config
            .synonyms
            .iter()
            .map(|(key, aliases)| {
                let aliases = aliases
                    .iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect();
                (key.trim().to_lowercase(), aliases)
            })
            .collect();

        Self {
            min_token_len: config.min_token_len,
            stop_words,
            synonyms,
        }
    }

    /// Base tokens that survive the length and stop-word filters.
    pub fn base_tokens(&self, text: &str) -> BTreeSet<String> {
        tokenize(text)
            .filter(|t| t.chars().count() >= self.min_token_len)
            .filter(|t| !self.stop_words.contains(t))
            .collect()
    }

    /// Base tokens plus the aliases of every base token that is a synonym key.
    ///
    /// Aliases are never looked up again.
    pub fn analyze(&self, text: &str) -> KeywordSet {
        let base = self.base_tokens(text);
        let mut keywords = base.clone();
        for token in &base {
            if let Some(aliases) = self.synonyms.get(token) {
                keywords.extend(aliases.iter().cloned());
            }
        }
        KeywordSet(keywords)
    }
}

/// Lowercase alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(&RetrievalConfig::default())
    }

    fn set(words: &[&str]) -> KeywordSet {
        words.iter().copied().collect()
    }

    #[test]
    fn tokenize_splits_on_non_alphanumerics() {
        let tokens: Vec<String> = tokenize("Set IGN_ON, wait 2s; check MIL-lamp!").collect();
        assert_eq!(
            tokens,
            vec!["set", "ign", "on", "wait", "2s", "check", "mil", "lamp"]
        );
    }

    #[test]
    fn short_tokens_and_stop_words_dropped() {
        let base = analyzer().base_tokens("Measure the value of Oil in a tank");
        assert_eq!(
            base,
            ["oil", "tank"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
    }

    #[test]
    fn remove_fault_expands_aliases() {
        let keywords = analyzer().analyze("remove fault");
        for expected in [
            "remove", "fault", "deactivate", "release", "clear", "reset", "fiu", "short",
            "circuit", "failure", "scg",
        ] {
            assert!(keywords.contains(expected), "missing {expected}");
        }
        assert_eq!(keywords.len(), 11);
    }

    #[test]
    fn expansion_is_one_level_deep() {
        let mut config = RetrievalConfig::default();
        config.synonyms.clear();
        config.synonyms.insert("alpha".into(), vec!["beta".into()]);
        config.synonyms.insert("beta".into(), vec!["gamma".into()]);

        let keywords = QueryAnalyzer::new(&config).analyze("alpha");
        assert_eq!(keywords, set(&["alpha", "beta"]));
    }

    #[test]
    fn stop_words_are_not_expanded() {
        let mut config = RetrievalConfig::default();
        config.stop_words.push("check".into());
        let keywords = QueryAnalyzer::new(&config).analyze("check");
        assert!(keywords.is_empty());
    }

    #[test]
    fn empty_and_noise_only_input() {
        assert!(analyzer().analyze("").is_empty());
        assert!(analyzer().analyze("the and of a to").is_empty());
        assert!(analyzer().analyze("!!! ?? --").is_empty());
    }

    #[test]
    fn config_tables_are_normalized() {
        let mut config = RetrievalConfig::default();
        config.stop_words = vec!["  TANK ".into()];
        config.synonyms.clear();
        config
            .synonyms
            .insert("Door".into(), vec!["LATCH".into(), " ".into()]);
        let keywords = QueryAnalyzer::new(&config).analyze("door tank");
        assert_eq!(keywords, set(&["door", "latch"]));
    }

    #[test]
    fn keyword_set_from_iter_drops_empty() {
        let keywords = set(&["a", "", "b", "a"]);
        assert_eq!(keywords.len(), 2);
        assert!(set(&["a"]).is_subset(&keywords));
    }
}
