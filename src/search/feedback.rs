//! Pseudo-relevance feedback: pick expansion terms from the top documents of an initial
//! ranking and interpolate them with the original query.

use std::collections::BTreeMap;
use crate::core::config::FeedbackConfig;
use crate::core::error::Result;
use crate::core::types::{DocId, DEFAULT_FIELD};
use crate::index::corpus::{CorpusAccessor, TermVector};
use crate::query::ast::{OperatorKind, QueryNode};
use crate::scoring::scorer::corpus_probability;
use crate::search::results::ScoreList;
use crate::search::trec::RankingEntry;

/// Document used as relevance evidence
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDocument {
    pub doc_id: DocId,
    pub score: f64,  // Linear-space relevance
    pub length: u64,
    pub term_vector: TermVector,
}

/// Candidate expansion term
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackTerm {
    pub term: String,
    pub importance: f64,
    pub corpus_probability: f64,
}

/// Builds expansion queries from feedback documents
#[derive(Debug, Clone)]
pub struct QueryExpander {
    pub docs: usize,
    pub terms: usize,
    pub mu: f64,
    pub orig_weight: f64,
    pub field: String,
}

impl QueryExpander {
    pub fn new(config: &FeedbackConfig) -> Self {
        QueryExpander {
            docs: config.docs,
            terms: config.terms,
            mu: config.mu,
            orig_weight: config.orig_weight,
            field: DEFAULT_FIELD.to_string(),
        }
    }

    /// Top `docs` entries of a ranked score list. Scores are log-space and get exponentiated.
    pub fn documents_from_scores(&self, ranked: &ScoreList, corpus: &dyn CorpusAccessor) -> Result<Vec<FeedbackDocument>> {
        ranked.iter()
            .take(self.docs)
            .map(|entry| self.document(entry.doc_id, entry.score.exp(), corpus))
            .collect()
    }

    /// Top `docs` lines of an external ranking for one query. Negative scores are taken to
    /// be log-space and exponentiated; unknown external ids fail with `NotFound`.
    pub fn documents_from_ranking(&self, ranking: &[RankingEntry], corpus: &dyn CorpusAccessor) -> Result<Vec<FeedbackDocument>> {
        ranking.iter()
            .take(self.docs)
            .map(|entry| {
                let doc_id = corpus.internal_id(&entry.external_id)?;
                let score = if entry.score < 0.0 { entry.score.exp() } else { entry.score };
                self.document(doc_id, score, corpus)
            })
            .collect()
    }

    fn document(&self, doc_id: DocId, score: f64, corpus: &dyn CorpusAccessor) -> Result<FeedbackDocument> {
        let term_vector = corpus.term_vector(&self.field, doc_id)?;
        Ok(FeedbackDocument {
            doc_id,
            score,
            length: term_vector.length,
            term_vector,
        })
    }

    /// Rank every feedback term by
    /// `Σ_d (tf + mu·p_c) / (|d| + mu) · score(d) · ln(1 / p_c)` and keep the best `terms`.
    /// Terms containing punctuation are never candidates.
    pub fn select_terms(&self, documents: &[FeedbackDocument], corpus: &dyn CorpusAccessor) -> Result<Vec<FeedbackTerm>> {
        let total_terms = corpus.total_term_count(&self.field)?;

        // BTreeMap keeps the candidate order, and so tie-breaking, deterministic
        let mut candidates: BTreeMap<&str, f64> = BTreeMap::new();
        for document in documents {
            for entry in &document.term_vector.entries {
                if entry.stem.chars().any(|c| c.is_ascii_punctuation()) {
                    continue;
                }
                candidates.entry(entry.stem.as_str())
                    .or_insert_with(|| corpus_probability(entry.corpus_term_freq, total_terms));
            }
        }

        let mut terms: Vec<FeedbackTerm> = candidates.into_iter()
            .map(|(term, p_c)| {
                let idf = (1.0 / p_c).ln();
                let importance = documents.iter()
                    .filter(|document| document.length as f64 + self.mu > 0.0)
                    .map(|document| {
                        let tf = document.term_vector.term_freq(term) as f64;
                        (tf + self.mu * p_c) / (document.length as f64 + self.mu) * document.score * idf
                    })
                    .sum::<f64>();
                FeedbackTerm {
                    term: term.to_string(),
                    importance,
                    corpus_probability: p_c,
                }
            })
            .collect();

        terms.sort_by(|a, b| {
            b.importance.total_cmp(&a.importance)
                .then_with(|| a.term.cmp(&b.term))
        });
        terms.truncate(self.terms);
        Ok(terms)
    }

    /// `#WAND` over the selected terms, weighted by importance.
    pub fn expanded_query(&self, terms: &[FeedbackTerm]) -> Result<QueryNode> {
        QueryNode::weighted(
            OperatorKind::WeightedAnd,
            terms.iter().map(|term| (term.importance, QueryNode::term(term.term.clone(), self.field.clone()))),
        )
    }

    /// Select terms from `documents` and build the expansion query.
    pub fn expand(&self, documents: &[FeedbackDocument], corpus: &dyn CorpusAccessor) -> Result<QueryNode> {
        let terms = self.select_terms(documents, corpus)?;
        log::debug!("Selected {} expansion terms from {} documents", terms.len(), documents.len());
        self.expanded_query(&terms)
    }

    /// `#WAND( w original (1-w) expanded )`
    pub fn combine(&self, original: QueryNode, expanded: QueryNode) -> Result<QueryNode> {
        QueryNode::weighted(
            OperatorKind::WeightedAnd,
            [(self.orig_weight, original), (1.0 - self.orig_weight, expanded)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::index::corpus::MemoryCorpus;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn expander(terms: usize) -> QueryExpander {
        QueryExpander::new(&FeedbackConfig { terms, ..FeedbackConfig::default() })
    }

    fn corpus() -> MemoryCorpus {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("a", vec![("body", tokens("shared alpha"))]).unwrap();
        builder.add_document("b", vec![("body", tokens("shared beta"))]).unwrap();
        // Gives alpha the same corpus frequency as shared
        builder.add_document("c", vec![("body", tokens("alpha gamma u.s"))]).unwrap();
        builder.build()
    }

    fn ranking(corpus: &MemoryCorpus) -> ScoreList {
        let mut ranked = ScoreList::new();
        ranked.add(corpus.internal_id("a").unwrap(), -1.0);
        ranked.add(corpus.internal_id("b").unwrap(), -1.0);
        ranked
    }

    #[test]
    fn shared_terms_outrank_single_document_terms() {
        let corpus = corpus();
        let expander = expander(10);
        let documents = expander.documents_from_scores(&ranking(&corpus), &corpus).unwrap();
        assert_eq!(documents.len(), 2);
        assert!((documents[0].score - (-1.0f64).exp()).abs() < 1e-12);

        let terms = expander.select_terms(&documents, &corpus).unwrap();
        let shared = terms.iter().find(|t| t.term == "shared").unwrap();
        let alpha = terms.iter().find(|t| t.term == "alpha").unwrap();
        assert_eq!(shared.corpus_probability, alpha.corpus_probability);
        assert!(shared.importance > alpha.importance);
        assert_eq!(terms[0].term, "shared");
        // Only terms of feedback documents are candidates
        assert!(terms.iter().all(|t| t.term != "gamma"));
    }

    #[test]
    fn punctuated_terms_are_skipped_and_count_is_bounded() {
        let corpus = corpus();
        let expander = QueryExpander { docs: 3, ..expander(2) };
        let mut ranked = ranking(&corpus);
        ranked.add(corpus.internal_id("c").unwrap(), -2.0);

        let documents = expander.documents_from_scores(&ranked, &corpus).unwrap();
        let terms = expander.select_terms(&documents, &corpus).unwrap();
        assert_eq!(terms.len(), 2);

        let all = QueryExpander { terms: 100, ..expander.clone() }.select_terms(&documents, &corpus).unwrap();
        assert!(all.iter().all(|t| t.term != "u.s"));
    }

    #[test]
    fn expansion_query_renders_as_weighted_and() {
        let corpus = corpus();
        let expander = expander(1);
        let documents = expander.documents_from_scores(&ranking(&corpus), &corpus).unwrap();
        let expanded = expander.expand(&documents, &corpus).unwrap();
        assert!(expanded.to_string().starts_with("#WAND( "));
        assert!(expanded.to_string().ends_with(" shared.body )"));

        let combined = expander.combine(QueryNode::term("alpha", "body"), expanded).unwrap();
        assert!(combined.to_string().starts_with("#WAND( 0.5000 alpha.body 0.5000 #WAND("));
    }

    #[test]
    fn ranking_entries_must_exist_in_the_corpus() {
        let corpus = corpus();
        let entry = RankingEntry {
            query_id: 1,
            external_id: "missing".to_string(),
            rank: 1,
            score: 0.5,
            run_id: "run-1".to_string(),
        };
        let err = expander(10).documents_from_ranking(&[entry], &corpus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn ranking_scores_are_made_linear() {
        let corpus = corpus();
        let entries = vec![
            RankingEntry { query_id: 1, external_id: "a".to_string(), rank: 1, score: -0.5, run_id: "r".to_string() },
            RankingEntry { query_id: 1, external_id: "b".to_string(), rank: 2, score: 0.25, run_id: "r".to_string() },
        ];
        let documents = expander(10).documents_from_ranking(&entries, &corpus).unwrap();
        assert!((documents[0].score - (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(documents[1].score, 0.25);
    }
}
