pub mod core;
pub mod analysis;
pub mod index;
pub mod scoring;
pub mod query;
pub mod search;
pub mod letor;

/*
QRYEVAL ARCHITECTURE

  parameter file ──► core::config::Config ──► search::executor::QueryExecutor
                                                    │
     query file ──► search::trec::read_queries ─────┤
                                                    ▼
  query text ──► query::parser::QueryParser ──► query::ast::QueryNode
                  (analysis::Analyzer stems)         │
                                                    ▼
               query::evaluator::evaluate(node, model, &dyn CorpusAccessor)
                 │  Syn / Near / Window ──► query::daat kernels ──► index::posting::InvertedList
                 │  Score (implicit)     ──► scoring::scorer per model
                 │  And / Or / Sum / WAnd / WSum ──► DaaT union/intersect + default scores
                 ▼
               search::results::ScoreList ──► sort_and_truncate (top 100, BinaryHeap)
                 │
                 ├── fb=true ──► search::feedback::QueryExpander ──► #WAND(orig, expansion)
                 ├── letor   ──► letor::ranker::LetorRanker (features + svm_rank)
                 ▼
               search::trec::RankingWriter ──► trec_eval ranking file

  index::corpus::MemoryCorpus implements CorpusAccessor from a bincode / JSON snapshot.
*/
