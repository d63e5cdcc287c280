//! Operator tree evaluation.
//!
//! Inverted-list operators (terms, `#SYN`, `#NEAR`, `#WINDOW`) are evaluated independently of
//! the retrieval model; score-list operators combine their children's score lists with the
//! document-at-a-time kernels in `query::daat`, under the rules of the active model.

use crate::core::error::{Error, Result};
use crate::core::types::{DocId, DEFAULT_FIELD};
use crate::index::corpus::CorpusAccessor;
use crate::index::posting::InvertedList;
use crate::query::ast::{QueryNode, WeightedChildren};
use crate::query::daat::{intersect, ordered_window_starts, union, unordered_window_ends};
use crate::scoring::model::{Bm25Params, IndriParams, RetrievalModel};
use crate::scoring::scorer::{corpus_probability, score_inverted_list};
use crate::search::results::{QueryResult, ScoreList};

/// Evaluate `node` against `corpus`. Exactly one side of the result is populated: an inverted
/// list for term and proximity operators, a score list for everything else.
pub fn evaluate(node: &QueryNode, model: &RetrievalModel, corpus: &dyn CorpusAccessor) -> Result<QueryResult> {
    node.validate()?;
    let evaluator = Evaluator::new(model, corpus);
    if node.produces_inverted_list() {
        Ok(QueryResult::Inverted(evaluator.inverted(node)?))
    } else {
        Ok(QueryResult::Scores(evaluator.scored(node)?.scores))
    }
}

impl QueryNode {
    pub fn evaluate(&self, model: &RetrievalModel, corpus: &dyn CorpusAccessor) -> Result<QueryResult> {
        evaluate(self, model, corpus)
    }

    /// Score this node assigns to a document it does not match.
    pub fn default_score(&self, model: &RetrievalModel, corpus: &dyn CorpusAccessor, doc_id: DocId) -> Result<f64> {
        Evaluator::new(model, corpus)
            .fallback(self)?
            .score(corpus, doc_id)
    }
}

/// Default-score rule of an evaluated node, kept so parents can score documents the node
/// did not match without evaluating it again.
#[derive(Debug, Clone, PartialEq)]
enum Fallback {
    Zero,
    Background { field: String, p_c: f64, params: IndriParams },
    Mean(Vec<Fallback>),
    WeightedMean(Vec<(f64, Fallback)>),
    WeightedLogSum(Vec<(f64, Fallback)>),
}

impl Fallback {
    fn score(&self, corpus: &dyn CorpusAccessor, doc_id: DocId) -> Result<f64> {
        match self {
            Fallback::Zero => Ok(0.0),
            Fallback::Background { field, p_c, params } => {
                let doc_length = corpus.document_length(field, doc_id)?;
                Ok(params.default_score(doc_length, *p_c))
            }
            Fallback::Mean(children) => {
                if children.is_empty() {
                    return Ok(0.0);
                }
                let mut sum = 0.0;
                for child in children {
                    sum += child.score(corpus, doc_id)?;
                }
                Ok(sum / children.len() as f64)
            }
            Fallback::WeightedMean(children) => {
                let total: f64 = children.iter().map(|(w, _)| w).sum();
                if total <= 0.0 {
                    return Ok(f64::NEG_INFINITY);
                }
                let mut sum = 0.0;
                for (weight, child) in children {
                    sum += weight * child.score(corpus, doc_id)?;
                }
                Ok(sum / total)
            }
            Fallback::WeightedLogSum(children) => {
                let total: f64 = children.iter().map(|(w, _)| w).sum();
                if total <= 0.0 {
                    return Ok(f64::NEG_INFINITY);
                }
                let mut sum = 0.0;
                for (weight, child) in children {
                    sum += weight * child.score(corpus, doc_id)?.exp();
                }
                Ok((sum / total).ln())
            }
        }
    }
}

/// Score list of one node plus its default-score rule
struct Scored {
    scores: ScoreList,
    fallback: Fallback,
}

/// Evaluates nodes under one retrieval model. Holds no state beyond the borrowed model and
/// corpus, so one evaluator may serve any number of nodes.
pub struct Evaluator<'a> {
    model: &'a RetrievalModel,
    corpus: &'a dyn CorpusAccessor,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a RetrievalModel, corpus: &'a dyn CorpusAccessor) -> Self {
        Evaluator { model, corpus }
    }

    /// Inverted list of a term, `#SYN`, `#NEAR` or `#WINDOW` node.
    pub fn inverted(&self, node: &QueryNode) -> Result<InvertedList> {
        match node {
            QueryNode::Term { field, stem } => self.corpus.postings(field, stem),
            QueryNode::Syn(children) => self.synonym(node, children),
            QueryNode::Near { distance, children } => {
                self.proximity(node, children, |positions| ordered_window_starts(positions, *distance))
            }
            QueryNode::Window { distance, children } => {
                self.proximity(node, children, |positions| unordered_window_ends(positions, *distance))
            }
            _ => Err(Error::structure(format!("{} does not produce an inverted list", node))),
        }
    }

    /// Score list of `node` under the evaluator's model.
    pub fn score_list(&self, node: &QueryNode) -> Result<ScoreList> {
        Ok(self.scored(node)?.scores)
    }

    fn children_inverted(&self, children: &[QueryNode]) -> Result<Vec<InvertedList>> {
        children.iter().map(|child| self.inverted(child)).collect()
    }

    fn synonym(&self, node: &QueryNode, children: &[QueryNode]) -> Result<InvertedList> {
        let lists = self.children_inverted(children)?;
        let mut merged = InvertedList::new(common_field(node, &lists)?);
        let streams: Vec<&InvertedList> = lists.iter().collect();

        union(&streams, |doc_id, present| {
            let mut positions: Vec<u32> = present.iter()
                .zip(&lists)
                .filter_map(|(index, list)| index.map(|i| &list.postings[i].positions))
                .flatten()
                .copied()
                .collect();
            positions.sort_unstable();
            positions.dedup();
            merged.append_posting(doc_id, positions);
            Ok(())
        })?;

        Ok(merged)
    }

    fn proximity<F>(&self, node: &QueryNode, children: &[QueryNode], windows: F) -> Result<InvertedList>
    where
        F: Fn(&[&[u32]]) -> Vec<u32>,
    {
        let lists = self.children_inverted(children)?;
        let mut result = InvertedList::new(common_field(node, &lists)?);
        let streams: Vec<&InvertedList> = lists.iter().collect();

        intersect(&streams, |doc_id, indices| {
            let positions: Vec<&[u32]> = indices.iter()
                .zip(&lists)
                .map(|(&i, list)| list.postings[i].positions.as_slice())
                .collect();
            // Documents without a satisfying window are skipped by append_posting
            result.append_posting(doc_id, windows(&positions));
            Ok(())
        })?;

        Ok(result)
    }

    fn scored(&self, node: &QueryNode) -> Result<Scored> {
        // Inverted-list operators under a score operator are scored implicitly
        if node.produces_inverted_list() {
            return self.score_inverted(node);
        }

        match (node, self.model) {
            (QueryNode::Score(child), _) => {
                if !child.produces_inverted_list() {
                    return Err(Error::structure(format!(
                        "#SCORE expects an inverted list argument, found {}", child
                    )));
                }
                self.score_inverted(child)
            }
            (QueryNode::And(children), RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean) => {
                self.boolean_and(children)
            }
            (QueryNode::And(children), RetrievalModel::Indri(_)) => self.indri_and(children),
            (QueryNode::Or(children), RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean) => {
                self.boolean_or(children)
            }
            (QueryNode::Sum(children), RetrievalModel::Bm25(params)) => self.sum(children, params),
            (QueryNode::WeightedAnd(weighted), RetrievalModel::Indri(_)) => self.weighted_and(weighted),
            (QueryNode::WeightedSum(weighted), RetrievalModel::Indri(_)) => self.weighted_sum(weighted),
            _ => Err(Error::unsupported(format!(
                "{} is not supported by the {} retrieval model",
                node.kind().map(|kind| kind.to_string()).unwrap_or_else(|| node.to_string()),
                self.model.kind()
            ))),
        }
    }

    fn score_inverted(&self, node: &QueryNode) -> Result<Scored> {
        let list = self.inverted(node)?;
        let (scores, term_stats) = score_inverted_list(&list, self.model, self.corpus)?;
        let fallback = match self.model {
            RetrievalModel::Indri(params) => Fallback::Background {
                field: list.field,
                p_c: term_stats.corpus_probability,
                params: *params,
            },
            _ => Fallback::Zero,
        };
        Ok(Scored { scores, fallback })
    }

    fn children_scored(&self, children: &[QueryNode]) -> Result<Vec<Scored>> {
        children.iter().map(|child| self.scored(child)).collect()
    }

    /// Default-score rule of `node` without evaluating its score list.
    fn fallback(&self, node: &QueryNode) -> Result<Fallback> {
        let RetrievalModel::Indri(params) = self.model else {
            return Ok(Fallback::Zero);
        };

        match node {
            QueryNode::Term { field, stem } => {
                let ctf = self.corpus.corpus_term_frequency(field, stem)?;
                let total = self.corpus.total_term_count(field)?;
                Ok(Fallback::Background { field: field.clone(), p_c: corpus_probability(ctf, total), params: *params })
            }
            QueryNode::Syn(_) | QueryNode::Near { .. } | QueryNode::Window { .. } => {
                let list = self.inverted(node)?;
                let total = self.corpus.total_term_count(&list.field)?;
                Ok(Fallback::Background { p_c: corpus_probability(list.ctf, total), field: list.field, params: *params })
            }
            QueryNode::Score(child) => self.fallback(child),
            QueryNode::And(children) => Ok(Fallback::Mean(
                children.iter().map(|child| self.fallback(child)).collect::<Result<_>>()?,
            )),
            QueryNode::WeightedAnd(weighted) => Ok(Fallback::WeightedMean(self.weighted_fallbacks(weighted)?)),
            QueryNode::WeightedSum(weighted) => Ok(Fallback::WeightedLogSum(self.weighted_fallbacks(weighted)?)),
            QueryNode::Or(_) | QueryNode::Sum(_) => Ok(Fallback::Zero),
        }
    }

    fn weighted_fallbacks(&self, weighted: &WeightedChildren) -> Result<Vec<(f64, Fallback)>> {
        weighted.iter()
            .map(|(weight, child)| Ok((weight, self.fallback(child)?)))
            .collect()
    }

    fn boolean_and(&self, children: &[QueryNode]) -> Result<Scored> {
        let scored = self.children_scored(children)?;
        let streams: Vec<&ScoreList> = scored.iter().map(|s| &s.scores).collect();
        let ranked = matches!(self.model, RetrievalModel::RankedBoolean);
        let mut result = ScoreList::new();

        intersect(&streams, |doc_id, indices| {
            let score = if ranked {
                indices.iter()
                    .zip(&streams)
                    .map(|(&i, stream)| stream.score(i))
                    .fold(f64::INFINITY, f64::min)
            } else {
                1.0
            };
            result.add(doc_id, score);
            Ok(())
        })?;

        Ok(Scored { scores: result, fallback: Fallback::Zero })
    }

    fn boolean_or(&self, children: &[QueryNode]) -> Result<Scored> {
        let scored = self.children_scored(children)?;
        let ranked = matches!(self.model, RetrievalModel::RankedBoolean);

        let scores = merge_union(&scored, |_, scores| {
            if !ranked {
                return Ok(1.0);
            }
            Ok(scores.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max))
        })?;

        Ok(Scored { scores, fallback: Fallback::Zero })
    }

    fn sum(&self, children: &[QueryNode], params: &Bm25Params) -> Result<Scored> {
        let scored = self.children_scored(children)?;
        // Every query term occurs once
        let user_weight = params.user_weight(1.0);

        let scores = merge_union(&scored, |_, scores| {
            Ok(scores.iter().flatten().map(|score| user_weight * score).sum())
        })?;

        Ok(Scored { scores, fallback: Fallback::Zero })
    }

    fn indri_and(&self, children: &[QueryNode]) -> Result<Scored> {
        let scored = self.children_scored(children)?;
        let count = scored.len() as f64;

        let scores = merge_union(&scored, |doc_id, scores| {
            let mut sum = 0.0;
            for (score, child) in scores.iter().zip(&scored) {
                sum += match score {
                    Some(score) => *score,
                    None => child.fallback.score(self.corpus, doc_id)?,
                };
            }
            Ok(sum / count)
        })?;

        let fallback = Fallback::Mean(scored.into_iter().map(|s| s.fallback).collect());
        Ok(Scored { scores, fallback })
    }

    fn weighted_and(&self, weighted: &WeightedChildren) -> Result<Scored> {
        self.weighted(weighted, Fallback::WeightedMean, |sum, weight, score| sum + weight * score, |sum| sum)
    }

    fn weighted_sum(&self, weighted: &WeightedChildren) -> Result<Scored> {
        self.weighted(weighted, Fallback::WeightedLogSum, |sum, weight, score| sum + weight * score.exp(), f64::ln)
    }

    /// Shared body of `#WAND` and `#WSUM`: fold weighted child scores, normalise by the total
    /// weight, then `finish`. A zero total weight matches nothing.
    fn weighted<A, F>(
        &self,
        weighted: &WeightedChildren,
        rule: fn(Vec<(f64, Fallback)>) -> Fallback,
        accumulate: A,
        finish: F,
    ) -> Result<Scored>
    where
        A: Fn(f64, f64, f64) -> f64,
        F: Fn(f64) -> f64,
    {
        let scored = self.children_scored(&weighted.children)?;
        let total = weighted.total_weight();

        let scores = if total > 0.0 {
            merge_union(&scored, |doc_id, scores| {
                let mut sum = 0.0;
                for ((score, child), weight) in scores.iter().zip(&scored).zip(&weighted.weights) {
                    let score = match score {
                        Some(score) => *score,
                        None => child.fallback.score(self.corpus, doc_id)?,
                    };
                    sum = accumulate(sum, *weight, score);
                }
                Ok(finish(sum / total))
            })?
        } else {
            ScoreList::new()
        };

        let fallbacks = weighted.weights.iter().copied()
            .zip(scored.into_iter().map(|s| s.fallback))
            .collect();
        Ok(Scored { scores, fallback: rule(fallbacks) })
    }
}

/// Union of the children's score lists; `combine` gets each child's score at the document,
/// `None` where the child has no entry.
fn merge_union<F>(children: &[Scored], mut combine: F) -> Result<ScoreList>
where
    F: FnMut(DocId, &[Option<f64>]) -> Result<f64>,
{
    let streams: Vec<&ScoreList> = children.iter().map(|child| &child.scores).collect();
    let mut merged = ScoreList::new();
    let mut scores = vec![None; streams.len()];

    union(&streams, |doc_id, present| {
        for ((slot, index), stream) in scores.iter_mut().zip(present).zip(&streams) {
            *slot = index.map(|i| stream.score(i));
        }
        merged.add(doc_id, combine(doc_id, &scores)?);
        Ok(())
    })?;

    Ok(merged)
}

/// Field shared by the argument lists of a positional operator.
fn common_field(node: &QueryNode, lists: &[InvertedList]) -> Result<String> {
    let Some(first) = lists.first() else {
        return Ok(DEFAULT_FIELD.to_string());
    };
    if let Some(other) = lists.iter().find(|list| list.field != first.field) {
        return Err(Error::structure(format!(
            "{} mixes fields '{}' and '{}'", node, first.field, other.field
        )));
    }
    Ok(first.field.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::index::corpus::MemoryCorpus;
    use crate::query::ast::OperatorKind;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn corpus() -> MemoryCorpus {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("d0", vec![("body", tokens("apple banana")), ("title", tokens("apple"))]).unwrap();
        builder.add_document("d1", vec![("body", tokens("apple cherry cherry"))]).unwrap();
        builder.add_document("d2", vec![("body", tokens("banana"))]).unwrap();
        builder.build()
    }

    fn term(stem: &str) -> QueryNode {
        QueryNode::term(stem, "body")
    }

    fn scores(node: &QueryNode, model: &RetrievalModel, corpus: &MemoryCorpus) -> Vec<(u64, f64)> {
        let result = evaluate(node, model, corpus).unwrap();
        result.score_list().unwrap()
            .iter()
            .map(|entry| (entry.doc_id.value(), entry.score))
            .collect()
    }

    #[test]
    fn synonym_merges_positions() {
        let corpus = corpus();
        let node = QueryNode::Syn(vec![term("apple"), term("cherry")]);
        let result = evaluate(&node, &RetrievalModel::UnrankedBoolean, &corpus).unwrap();
        let list = result.inverted_list().unwrap();

        assert_eq!(list.doc_ids().collect::<Vec<_>>(), vec![DocId(0), DocId(1)]);
        assert_eq!(list.postings[1].positions, vec![0, 1, 2]);
        assert_eq!(list.ctf, 4);
    }

    #[test]
    fn proximity_across_fields_is_rejected() {
        let corpus = corpus();
        let node = QueryNode::Near {
            distance: 1,
            children: vec![term("apple"), QueryNode::term("apple", "title")],
        };
        let err = evaluate(&node, &RetrievalModel::UnrankedBoolean, &corpus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structure);
    }

    #[test]
    fn boolean_and_or() {
        let corpus = corpus();
        let and = QueryNode::And(vec![term("apple"), term("cherry")]);
        assert_eq!(scores(&and, &RetrievalModel::UnrankedBoolean, &corpus), vec![(1, 1.0)]);
        // Ranked AND keeps the weakest child score
        assert_eq!(scores(&and, &RetrievalModel::RankedBoolean, &corpus), vec![(1, 1.0)]);

        let or = QueryNode::Or(vec![term("apple"), term("cherry")]);
        assert_eq!(scores(&or, &RetrievalModel::RankedBoolean, &corpus), vec![(0, 1.0), (1, 2.0)]);
    }

    #[test]
    fn bm25_sum_adds_term_scores() {
        let corpus = corpus();
        let params = Bm25Params::default();
        let model = RetrievalModel::Bm25(params);
        let node = QueryNode::Sum(vec![term("apple"), term("cherry")]);

        let apple = scores(&QueryNode::Score(Box::new(term("apple"))), &model, &corpus);
        let cherry = scores(&QueryNode::Score(Box::new(term("cherry"))), &model, &corpus);
        let sum = scores(&node, &model, &corpus);

        assert_eq!(sum.len(), 2);
        assert!((sum[0].1 - apple[0].1).abs() < 1e-12);
        assert!((sum[1].1 - (apple[1].1 + cherry[0].1)).abs() < 1e-12);
    }

    #[test]
    fn indri_and_scores_missing_terms_with_background() {
        let corpus = corpus();
        let params = IndriParams::default();
        let model = RetrievalModel::Indri(params);
        let node = QueryNode::And(vec![term("apple"), term("banana")]);
        let result = scores(&node, &model, &corpus);

        // Soft AND keeps every document that matches any term
        assert_eq!(result.iter().map(|(doc, _)| *doc).collect::<Vec<_>>(), vec![0, 1, 2]);

        let p_apple = 2.0 / 6.0;
        let p_banana = 2.0 / 6.0;
        let expected = (params.score(1, 3, p_apple) + params.default_score(3, p_banana)) / 2.0;
        assert!((result[1].1 - expected).abs() < 1e-12);

        let default = term("banana").default_score(&model, &corpus, DocId(1)).unwrap();
        assert!((default - params.default_score(3, p_banana)).abs() < 1e-12);
    }

    #[test]
    fn indri_weighted_sum_mixes_in_linear_space() {
        let corpus = corpus();
        let params = IndriParams::default();
        let model = RetrievalModel::Indri(params);
        let node = QueryNode::weighted(OperatorKind::WeightedSum, vec![(1.0, term("apple")), (3.0, term("cherry"))]).unwrap();
        let result = scores(&node, &model, &corpus);

        let a = params.score(1, 3, 2.0 / 6.0).exp();
        let c = params.score(2, 3, 2.0 / 6.0).exp();
        assert!((result[1].1 - ((a + 3.0 * c) / 4.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn zero_total_weight_matches_nothing() {
        let corpus = corpus();
        let model = RetrievalModel::Indri(IndriParams::default());
        let node = QueryNode::weighted(OperatorKind::WeightedAnd, vec![(0.0, term("apple"))]).unwrap();
        assert!(scores(&node, &model, &corpus).is_empty());
    }

    #[test]
    fn model_operator_mismatch_is_unsupported() {
        let corpus = corpus();
        let sum = QueryNode::Sum(vec![term("apple")]);
        let err = evaluate(&sum, &RetrievalModel::RankedBoolean, &corpus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedQuery);

        let or = QueryNode::Or(vec![term("apple")]);
        let err = evaluate(&or, &RetrievalModel::Indri(IndriParams::default()), &corpus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedQuery);
    }

    #[test]
    fn score_requires_an_inverted_list() {
        let corpus = corpus();
        let node = QueryNode::Score(Box::new(QueryNode::And(vec![term("apple")])));
        let err = evaluate(&node, &RetrievalModel::UnrankedBoolean, &corpus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structure);
    }
}
