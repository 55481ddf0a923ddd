//! Budgeted selection with a deterministic fallback.

use std::num::NonZeroUsize;

use tracing::{debug, warn};

use blockctx_shared::{Dictionary, DictionaryEntry, Snippet};

use crate::analyzer::KeywordSet;
use crate::scorer::{RelevanceScorer, search_text};

/// One entry that scored above zero for the current request.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'d> {
    pub entry: &'d DictionaryEntry,
    pub score: u32,
    /// Insertion index in the dictionary, used to break ties.
    pub position: usize,
}

/// How the returned snippets were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// Highest scores first; `matched` entries scored above zero.
    Ranked { matched: usize },
    /// Nothing matched; a fixed prefix of the dictionary was returned.
    Fallback,
}

/// Snippets picked for one request, best first.
#[derive(Debug, Clone)]
pub struct Selection<'d> {
    pub snippets: Vec<&'d Snippet>,
    pub kind: SelectionKind,
}

impl Selection<'_> {
    pub fn is_fallback(&self) -> bool {
        self.kind == SelectionKind::Fallback
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Owned copies, in selection order.
    pub fn to_snippets(&self) -> Vec<Snippet> {
        self.snippets.iter().map(|s| (*s).clone()).collect()
    }
}

/// Score every entry, drop zeros, order by score descending then insertion order.
pub fn rank<'d>(
    dictionary: &'d Dictionary,
    keywords: &KeywordSet,
    scorer: &RelevanceScorer,
) -> Vec<ScoredCandidate<'d>> {
    let mut candidates: Vec<ScoredCandidate<'d>> = dictionary
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let score = scorer.score_text(&search_text(&entry.json_snippet), keywords);
            (score > 0).then_some(ScoredCandidate {
                entry,
                score,
                position,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.position.cmp(&b.position)));
    candidates
}

/// Truncates ranked candidates to a budget.
#[derive(Debug, Clone)]
pub struct Selector {
    fallback_size: NonZeroUsize,
}

impl Selector {
    pub fn new(fallback_size: NonZeroUsize) -> Self {
        Self { fallback_size }
    }

    pub fn select<'d>(
        &self,
        dictionary: &'d Dictionary,
        keywords: &KeywordSet,
        scorer: &RelevanceScorer,
        budget: NonZeroUsize,
    ) -> Selection<'d> {
        let ranked = rank(dictionary, keywords, scorer);

        if ranked.is_empty() {
            // The generator degrades badly on an empty context, so hand it the
            // head of the dictionary instead.
            let take = self.fallback_size.min(budget).get();
            warn!(
                keywords = keywords.len(),
                fallback = take,
                "no dictionary entry matched, using fallback prefix"
            );
            return Selection {
                snippets: dictionary
                    .iter()
                    .take(take)
                    .map(|e| &e.json_snippet)
                    .collect(),
                kind: SelectionKind::Fallback,
            };
        }

        let matched = ranked.len();
        let snippets: Vec<&Snippet> = ranked
            .iter()
            .take(budget.get())
            .map(|c| &c.entry.json_snippet)
            .collect();

        debug!(matched, kept = snippets.len(), "selected dictionary entries");
        for (idx, candidate) in ranked.iter().take(10.min(snippets.len())).enumerate() {
            debug!(
                rank = idx + 1,
                score = candidate.score,
                link = %candidate.entry.json_snippet.library_link,
                "top candidate"
            );
        }

        Selection {
            snippets,
            kind: SelectionKind::Ranked { matched },
        }
    }
}
