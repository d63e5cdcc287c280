use crate::core::error::{Error, Result};
use crate::index::corpus::CorpusAccessor;
use crate::index::posting::{InvertedList, Posting};
use crate::scoring::model::{Bm25Params, IndriParams, RetrievalModel};
use crate::search::results::ScoreList;

/// Scorer trait
pub trait Scorer: Send + Sync {
    fn score(&self, posting: &Posting, term_stats: &TermStats, doc_stats: &DocStats) -> f64;

    /// Score of a document the term does not occur in.
    fn default_score(&self, _term_stats: &TermStats, _doc_stats: &DocStats) -> f64 {
        0.0
    }

    fn name(&self) -> &str;

    fn requires_doc_length(&self) -> bool {
        false
    }
}

/// Field-level statistics of one inverted list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermStats {
    pub doc_count: u64,           // Documents with a non-empty field
    pub doc_freq: u64,            // Documents in the list
    pub avg_doc_length: f64,
    pub corpus_probability: f64,  // Background probability of the list's term
}

impl TermStats {
    pub fn collect(list: &InvertedList, corpus: &dyn CorpusAccessor) -> Result<Self> {
        let total_terms = corpus.total_term_count(&list.field)?;
        Ok(TermStats {
            doc_count: corpus.document_count(&list.field)?,
            doc_freq: list.doc_freq() as u64,
            avg_doc_length: corpus.average_document_length(&list.field)?,
            corpus_probability: corpus_probability(list.ctf, total_terms),
        })
    }
}

/// Document statistics for scoring
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DocStats {
    pub doc_length: u64,  // Number of tokens in the list's field
}

/// `ctf / total_terms`, with a half-occurrence floor so unseen terms keep a finite log score.
pub fn corpus_probability(ctf: u64, total_terms: u64) -> f64 {
    (ctf as f64).max(0.5) / (total_terms.max(1) as f64)
}

/// Every matching document scores 1.0
pub struct UnrankedBooleanScorer;

impl Scorer for UnrankedBooleanScorer {
    fn score(&self, _posting: &Posting, _term_stats: &TermStats, _doc_stats: &DocStats) -> f64 {
        1.0
    }

    fn name(&self) -> &str {
        "unranked-boolean"
    }
}

/// Matching documents score their term frequency
pub struct RankedBooleanScorer;

impl Scorer for RankedBooleanScorer {
    fn score(&self, posting: &Posting, _term_stats: &TermStats, _doc_stats: &DocStats) -> f64 {
        posting.term_freq as f64
    }

    fn name(&self) -> &str {
        "ranked-boolean"
    }
}

impl Scorer for Bm25Params {
    /// `idf * normTf`; the query-side weight is applied by `#SUM`.
    fn score(&self, posting: &Posting, term_stats: &TermStats, doc_stats: &DocStats) -> f64 {
        let idf = self.idf(term_stats.doc_count, term_stats.doc_freq);
        idf * self.normalized_tf(posting.term_freq, doc_stats.doc_length, term_stats.avg_doc_length)
    }

    fn name(&self) -> &str {
        "bm25"
    }

    fn requires_doc_length(&self) -> bool {
        true
    }
}

impl Scorer for IndriParams {
    fn score(&self, posting: &Posting, term_stats: &TermStats, doc_stats: &DocStats) -> f64 {
        IndriParams::score(self, posting.term_freq, doc_stats.doc_length, term_stats.corpus_probability)
    }

    fn default_score(&self, term_stats: &TermStats, doc_stats: &DocStats) -> f64 {
        IndriParams::default_score(self, doc_stats.doc_length, term_stats.corpus_probability)
    }

    fn name(&self) -> &str {
        "indri"
    }

    fn requires_doc_length(&self) -> bool {
        true
    }
}

/// Term scorer of a retrieval model. The learning-to-rank model ranks through its base model.
pub fn scorer_for(model: &RetrievalModel) -> Result<&dyn Scorer> {
    match model {
        RetrievalModel::UnrankedBoolean => Ok(&UnrankedBooleanScorer as &dyn Scorer),
        RetrievalModel::RankedBoolean => Ok(&RankedBooleanScorer as &dyn Scorer),
        RetrievalModel::Bm25(params) => Ok(params as &dyn Scorer),
        RetrievalModel::Indri(params) => Ok(params as &dyn Scorer),
        RetrievalModel::Letor(_) => Err(Error::unsupported(
            "The letor model does not score terms; evaluate with its ranking model",
        )),
    }
}

/// Turn an inverted list into a score list under `model`.
pub fn score_inverted_list(
    list: &InvertedList,
    model: &RetrievalModel,
    corpus: &dyn CorpusAccessor,
) -> Result<(ScoreList, TermStats)> {
    let scorer = scorer_for(model)?;
    let term_stats = TermStats::collect(list, corpus)?;
    let mut scores = ScoreList::with_capacity(list.len());

    for posting in &list.postings {
        let doc_stats = if scorer.requires_doc_length() {
            DocStats { doc_length: corpus.document_length(&list.field, posting.doc_id)? }
        } else {
            DocStats::default()
        };
        scores.add(posting.doc_id, scorer.score(posting, &term_stats, &doc_stats));
    }

    log::trace!("Scored {} postings in {} with {}", list.len(), list.field, scorer.name());
    Ok((scores, term_stats))
}
