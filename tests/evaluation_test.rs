mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;
use qryeval::core::error::ErrorKind;
use qryeval::core::types::DocId;
use qryeval::index::corpus::MemoryCorpus;
use qryeval::query::ast::{OperatorKind, QueryNode};
use qryeval::query::evaluator::evaluate;
use qryeval::scoring::model::{Bm25Params, IndriParams, RetrievalModel};

use common::{body_corpus, tokens};

const WORDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn term(stem: &str) -> QueryNode {
    QueryNode::term(stem, "body")
}

fn corpus_from(docs: &[Vec<usize>]) -> MemoryCorpus {
    let mut builder = MemoryCorpus::builder();
    for (i, doc) in docs.iter().enumerate() {
        let body: Vec<String> = doc.iter().map(|&w| WORDS[w].to_string()).collect();
        builder.add_document(&format!("doc{}", i), vec![("body", body)]).unwrap();
    }
    builder.build()
}

fn docs_with(docs: &[Vec<usize>], word: usize) -> BTreeSet<u64> {
    docs.iter()
        .enumerate()
        .filter(|(_, doc)| doc.contains(&word))
        .map(|(i, _)| i as u64)
        .collect()
}

fn scored_ids(node: &QueryNode, model: &RetrievalModel, corpus: &MemoryCorpus) -> Vec<u64> {
    evaluate(node, model, corpus).unwrap()
        .score_list().unwrap()
        .iter()
        .map(|entry| entry.doc_id.value())
        .collect()
}

fn listed_ids(node: &QueryNode, corpus: &MemoryCorpus) -> Vec<u64> {
    evaluate(node, &RetrievalModel::UnrankedBoolean, corpus).unwrap()
        .inverted_list().unwrap()
        .doc_ids()
        .map(|id| id.value())
        .collect()
}

fn strictly_ascending(ids: &[u64]) -> bool {
    ids.windows(2).all(|pair| pair[0] < pair[1])
}

fn arb_docs() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0..WORDS.len(), 0..12), 1..40)
}

proptest! {
    #[test]
    fn and_is_intersection_or_is_union(docs in arb_docs(), a in 0..4usize, b in 0..4usize) {
        let corpus = corpus_from(&docs);
        let left = docs_with(&docs, a);
        let right = docs_with(&docs, b);

        for model in [RetrievalModel::UnrankedBoolean, RetrievalModel::RankedBoolean] {
            let and = scored_ids(&QueryNode::And(vec![term(WORDS[a]), term(WORDS[b])]), &model, &corpus);
            let or = scored_ids(&QueryNode::Or(vec![term(WORDS[a]), term(WORDS[b])]), &model, &corpus);

            prop_assert_eq!(and, left.intersection(&right).copied().collect::<Vec<_>>());
            prop_assert_eq!(or, left.union(&right).copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn every_operator_output_is_sorted(docs in arb_docs(), distance in 1..5u32) {
        let corpus = corpus_from(&docs);
        let children = || vec![term("alpha"), term("beta"), term("gamma")];

        for node in [
            QueryNode::Syn(children()),
            QueryNode::Near { distance, children: children() },
            QueryNode::Window { distance, children: children() },
        ] {
            prop_assert!(strictly_ascending(&listed_ids(&node, &corpus)));
        }

        let boolean = RetrievalModel::RankedBoolean;
        prop_assert!(strictly_ascending(&scored_ids(&QueryNode::And(children()), &boolean, &corpus)));
        prop_assert!(strictly_ascending(&scored_ids(&QueryNode::Or(children()), &boolean, &corpus)));

        let bm25 = RetrievalModel::Bm25(Bm25Params::default());
        prop_assert!(strictly_ascending(&scored_ids(&QueryNode::Sum(children()), &bm25, &corpus)));

        let indri = RetrievalModel::Indri(IndriParams::default());
        prop_assert!(strictly_ascending(&scored_ids(&QueryNode::And(children()), &indri, &corpus)));
        let wsum = QueryNode::weighted(
            OperatorKind::WeightedSum,
            [(0.7, term("alpha")), (0.3, QueryNode::Window { distance, children: children() })],
        ).unwrap();
        prop_assert!(strictly_ascending(&scored_ids(&wsum, &indri, &corpus)));
    }
}

#[test]
fn near_requires_order_and_distance() {
    // cat at position 5; dog at 6 in d0 and at 8 in d1
    let corpus = body_corpus(&[
        "x x x x x cat dog",
        "x x x x x cat x x dog",
        "x x x x x dog cat",
    ]);
    let near = |distance| QueryNode::Near { distance, children: vec![term("cat"), term("dog")] };

    assert_eq!(listed_ids(&near(1), &corpus), vec![0]);
    assert_eq!(listed_ids(&near(3), &corpus), vec![0, 1]);
}

#[test]
fn window_ignores_order() {
    let mut filler = vec!["x"; 10];
    filler.extend(["cat", "x", "dog"]);
    let forward = filler.join(" ");
    let backward = forward.replace("cat", "tmp").replace("dog", "cat").replace("tmp", "dog");
    let corpus = body_corpus(&[&forward, &backward]);
    let window = |width| QueryNode::Window { distance: width, children: vec![term("cat"), term("dog")] };

    assert_eq!(listed_ids(&window(3), &corpus), vec![0, 1]);
    assert!(listed_ids(&window(2), &corpus).is_empty());

    let list = evaluate(&window(3), &RetrievalModel::UnrankedBoolean, &corpus).unwrap();
    assert_eq!(list.inverted_list().unwrap().postings[0].positions, vec![12]);
}

#[test]
fn near_inside_ranked_boolean_counts_matches() {
    let corpus = body_corpus(&["new york new york", "york new", "new jersei"]);
    let node = QueryNode::Near { distance: 1, children: vec![term("new"), term("york")] };
    let result = evaluate(&QueryNode::Or(vec![node]), &RetrievalModel::RankedBoolean, &corpus).unwrap();
    let entries: Vec<(u64, f64)> = result.score_list().unwrap()
        .iter()
        .map(|entry| (entry.doc_id.value(), entry.score))
        .collect();

    assert_eq!(entries, vec![(0, 2.0)]);
}

#[test]
fn near_counts_every_start_that_reaches() {
    let corpus = body_corpus(&["cat cat dog", "cat dog bird"]);
    let near = QueryNode::Near { distance: 2, children: vec![term("cat"), term("dog")] };

    let result = evaluate(&near, &RetrievalModel::UnrankedBoolean, &corpus).unwrap();
    let list = result.inverted_list().unwrap();
    assert_eq!(list.postings[0].positions, vec![0, 1]);
    assert_eq!(list.postings[1].positions, vec![0]);

    let ranked = evaluate(&QueryNode::Or(vec![near]), &RetrievalModel::RankedBoolean, &corpus).unwrap();
    let scores: Vec<f64> = ranked.score_list().unwrap().iter().map(|entry| entry.score).collect();
    assert_eq!(scores, vec![2.0, 1.0]);

    // Nested proximity measures from where the inner chain starts
    let corpus = body_corpus(&["cat dog bird"]);
    let inner = QueryNode::Near { distance: 1, children: vec![term("cat"), term("dog")] };
    let outer = |distance| QueryNode::Near { distance, children: vec![inner.clone(), term("bird")] };
    assert!(listed_ids(&outer(1), &corpus).is_empty());
    assert_eq!(listed_ids(&outer(2), &corpus), vec![0]);
}

#[test]
fn bm25_score_matches_closed_form() {
    let params = Bm25Params { k1: 1.2, b: 0.75, k3: 0.0 };
    let score = params.idf(1000, 10) * params.normalized_tf(4, 200, 150.0) * params.user_weight(1.0);
    assert!((params.idf(1000, 10) - 4.547).abs() < 1e-3);
    assert!((params.normalized_tf(4, 200, 150.0) - 0.7273).abs() < 1e-4);
    assert!((score - 3.307).abs() < 1e-3);
}

#[test]
fn indri_default_score_is_finite() {
    let params = IndriParams { mu: 2500, lambda: 0.4 };
    let p_c = 500.0 / 1_000_000.0;
    let default = params.default_score(300, p_c);
    let expected = (0.4 * 2500.0 * 0.0005 / 2800.0 + 0.6 * 0.0005f64).ln();

    assert!(default.is_finite());
    assert!(default < 0.0);
    assert!((default - expected).abs() < 1e-12);
}

#[test]
fn indri_and_ranks_full_matches_first() {
    let corpus = body_corpus(&["cat dog", "cat bird", "dog fish", "fish bird"]);
    let model = RetrievalModel::Indri(IndriParams::default());
    let node = QueryNode::And(vec![term("cat"), term("dog")]);

    let mut ranked = evaluate(&node, &model, &corpus).unwrap().into_score_list().unwrap();
    assert_eq!(ranked.len(), 3);
    ranked.sort_and_truncate(&corpus).unwrap();

    assert_eq!(ranked.doc_id(0), DocId(0));
    assert!(ranked.iter().all(|entry| entry.score.is_finite()));
}

#[test]
fn model_operator_mismatch_is_unsupported() {
    let corpus = body_corpus(&["cat dog"]);
    let sum = QueryNode::Sum(vec![term("cat")]);
    let err = evaluate(&sum, &RetrievalModel::UnrankedBoolean, &corpus).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedQuery);

    let or = QueryNode::Or(vec![term("cat")]);
    let err = evaluate(&or, &RetrievalModel::Indri(IndriParams::default()), &corpus).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedQuery);
}

#[test]
fn fields_are_scored_independently() {
    let mut builder = MemoryCorpus::builder();
    builder.add_document("a", vec![("body", tokens("cat")), ("title", tokens("dog"))]).unwrap();
    builder.add_document("b", vec![("body", tokens("dog"))]).unwrap();
    let corpus = builder.build();

    let node = QueryNode::Or(vec![QueryNode::term("dog", "title")]);
    assert_eq!(scored_ids(&node, &RetrievalModel::UnrankedBoolean, &corpus), vec![0]);
}
