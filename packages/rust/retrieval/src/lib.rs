//! Context retrieval for blockctx.
//!
//! Picks the dictionary entries most relevant to a free-text request:
//! 1. [`QueryAnalyzer`] turns the request into an expanded [`KeywordSet`]
//! 2. [`RelevanceScorer`] scores every entry by substring hits plus boosts
//! 3. [`Selector`] keeps the top entries within a budget, or a fallback prefix
//!
//! Retrieval never touches the filesystem and never fails once constructed.

pub mod analyzer;
pub mod scorer;
pub mod selector;

use std::num::NonZeroUsize;

use tracing::{debug, instrument};

use blockctx_shared::{Dictionary, Result, RetrievalConfig, Snippet};

pub use analyzer::{KeywordSet, QueryAnalyzer, tokenize};
pub use scorer::{RelevanceScorer, search_text};
pub use selector::{ScoredCandidate, Selection, SelectionKind, Selector, rank};

/// Analyzer, scorer and selector built from one [`RetrievalConfig`].
#[derive(Debug, Clone)]
pub struct ContextRetriever {
    analyzer: QueryAnalyzer,
    scorer: RelevanceScorer,
    selector: Selector,
    budget: NonZeroUsize,
}

impl Default for ContextRetriever {
    fn default() -> Self {
        Self::from_valid(&RetrievalConfig::default())
    }
}

impl ContextRetriever {
    /// Build a retriever, rejecting configs with zero budgets or empty boost rules.
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: &RetrievalConfig) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(config),
            scorer: RelevanceScorer::new(&config.boosts),
            selector: Selector::new(non_zero(config.fallback_size)),
            budget: non_zero(config.budget),
        }
    }

    /// The budget used when a call does not override it.
    pub fn budget(&self) -> NonZeroUsize {
        self.budget
    }

    pub fn analyze(&self, query_text: &str) -> KeywordSet {
        self.analyzer.analyze(query_text)
    }

    /// Select entries for `query_text`, borrowing from the dictionary.
    #[instrument(skip_all, fields(entries = dictionary.len()))]
    pub fn select<'d>(
        &self,
        dictionary: &'d Dictionary,
        query_text: &str,
        budget: Option<NonZeroUsize>,
    ) -> Selection<'d> {
        let keywords = self.analyzer.analyze(query_text);
        debug!(keywords = ?keywords.iter().collect::<Vec<_>>(), "analyzed query");
        self.selector.select(
            dictionary,
            &keywords,
            &self.scorer,
            budget.unwrap_or(self.budget),
        )
    }

    /// Owned snippets for `query_text`, best first.
    pub fn select_context(
        &self,
        dictionary: &Dictionary,
        query_text: &str,
        budget: Option<NonZeroUsize>,
    ) -> Vec<Snippet> {
        self.select(dictionary, query_text, budget).to_snippets()
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Select context with the default tables.
pub fn select_context(
    dictionary: &Dictionary,
    query_text: &str,
    budget: NonZeroUsize,
) -> Vec<Snippet> {
    ContextRetriever::default().select_context(dictionary, query_text, Some(budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockctx_shared::DictionaryEntry;

    fn entry(library: &str, name: &str, params: &[&str]) -> DictionaryEntry {
        DictionaryEntry {
            keywords: name.split('_').map(String::from).collect(),
            json_snippet: Snippet {
                concept: name.replace('_', " "),
                library_link: format!("{library}.{name}"),
                xml_tag: "MainLibrary.Serial".into(),
                id: format!("{{{name}}}"),
                required_params: params.iter().map(|p| p.to_string()).collect(),
            },
        }
    }

    fn sample() -> Dictionary {
        Dictionary::new(vec![
            entry("TVSM_Library", "SET_CHECK_BATT_ON", &["Value"]),
            entry("TVSM_Library", "SET_IGN_ON", &[]),
            entry("TVSM_Library", "CHECK_CLUSTER_THROUGH_CAMERA", &["Pattern"]),
            entry("TVSM_Library", "DEACTIVATE_RELEASE_ERROR", &["Channel"]),
            entry("TVSM_Library", "ACTIVATE_FIU_SCG", &["Channel"]),
            entry("TVSM_Library", "WRITE_READ_GEAR", &["Gear"]),
            entry("TVSM_Library", "WAIT_TIME", &["Seconds"]),
        ])
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn links(snippets: &[Snippet]) -> Vec<&str> {
        snippets.iter().map(|s| s.library_link.as_str()).collect()
    }

    #[test]
    fn remove_fault_ranks_deactivate_first() {
        let dict = sample();
        let snippets = select_context(&dict, "Remove the fault on channel 3", nz(3));
        assert_eq!(links(&snippets)[0], "TVSM_Library.DEACTIVATE_RELEASE_ERROR");
        assert!(snippets.len() <= 3);
    }

    #[test]
    fn gear_request_prefers_gear_block() {
        let dict = sample();
        let snippets = select_context(&dict, "Shift gear to reverse", nz(2));
        assert_eq!(links(&snippets)[0], "TVSM_Library.WRITE_READ_GEAR");
    }

    #[test]
    fn unmatched_query_falls_back_to_prefix() {
        let dict = sample();
        let retriever = ContextRetriever::default();
        let selection = retriever.select(&dict, "xyzzy plugh", None);
        assert!(selection.is_fallback());
        assert_eq!(selection.len(), 5);
        assert_eq!(
            selection.snippets[0].library_link,
            "TVSM_Library.SET_CHECK_BATT_ON"
        );
    }

    #[test]
    fn config_budget_is_the_default() {
        let mut config = RetrievalConfig::default();
        config.budget = 2;
        let retriever = ContextRetriever::new(&config).unwrap();
        assert_eq!(retriever.budget().get(), 2);

        let dict = sample();
        let snippets = retriever.select_context(&dict, "check cluster camera set batt", None);
        assert_eq!(snippets.len(), 2);

        let wider = retriever.select_context(&dict, "check cluster camera set batt", Some(nz(4)));
        assert!(wider.len() > 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RetrievalConfig::default();
        config.fallback_size = 0;
        assert!(ContextRetriever::new(&config).is_err());
    }

    #[test]
    fn empty_dictionary_selects_nothing() {
        let dict = Dictionary::default();
        assert!(select_context(&dict, "remove fault", nz(10)).is_empty());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn shared_types_are_thread_safe() {
        assert_send_sync::<Dictionary>();
        assert_send_sync::<ContextRetriever>();
        assert_send_sync::<Selection<'static>>();
    }

    #[test]
    fn concurrent_selects_share_one_dictionary() {
        let dict = sample();
        let retriever = ContextRetriever::default();
        let (fault, gear) = std::thread::scope(|s| {
            let fault = s.spawn(|| {
                retriever.select_context(&dict, "Remove the fault on channel 3", Some(nz(1)))
            });
            let gear =
                s.spawn(|| retriever.select_context(&dict, "Shift gear to reverse", Some(nz(1))));
            (fault.join().unwrap(), gear.join().unwrap())
        });
        assert_eq!(links(&fault), ["TVSM_Library.DEACTIVATE_RELEASE_ERROR"]);
        assert_eq!(links(&gear), ["TVSM_Library.WRITE_READ_GEAR"]);
    }

    #[test]
    fn selection_is_deterministic() {
        let dict = sample();
        let retriever = ContextRetriever::default();
        let first = retriever.select_context(&dict, "simulate ignition then check screen", None);
        let second = retriever.select_context(&dict, "simulate ignition then check screen", None);
        assert_eq!(first, second);
    }
}
