use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use rayon::prelude::*;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::QueryId;
use crate::index::corpus::CorpusAccessor;
use crate::letor::ranker::LetorRanker;
use crate::query::ast::QueryNode;
use crate::query::evaluator::evaluate;
use crate::query::parser::QueryParser;
use crate::scoring::model::{LetorModel, RetrievalModel};
use crate::search::feedback::QueryExpander;
use crate::search::results::ScoreList;
use crate::search::trec::{read_queries, read_ranking, QueryLine, RankingEntry, RankingWriter};

/// Ranked result of one query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query_id: QueryId,
    pub ranked: ScoreList,
    pub expansion: Option<QueryNode>,  // Expansion query, when feedback is on
}

/// Totals of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub queries: usize,
    pub elapsed: Duration,
}

/// Evaluates query batches: parse, evaluate, truncate, expand, write
pub struct QueryExecutor {
    pub corpus: Arc<dyn CorpusAccessor>,
    pub config: Config,
    parser: QueryParser,
    expander: Option<QueryExpander>,
    feedback_rankings: Option<HashMap<QueryId, Vec<RankingEntry>>>,
}

impl QueryExecutor {
    pub fn new(corpus: Arc<dyn CorpusAccessor>, config: Config) -> Result<Self> {
        config.validate()?;
        let expander = config.feedback.as_ref().map(QueryExpander::new);
        let feedback_rankings = match config.feedback.as_ref().and_then(|f| f.initial_ranking_file.as_ref()) {
            Some(path) => {
                let rankings = read_ranking(path)?;
                log::info!("Loaded feedback rankings for {} queries from {}", rankings.len(), path.display());
                Some(rankings)
            }
            None => None,
        };
        log::info!("Retrieval model: {}", config.model.kind());

        Ok(QueryExecutor {
            parser: QueryParser::for_model(&config.model),
            corpus,
            config,
            expander,
            feedback_rankings,
        })
    }

    fn corpus(&self) -> &dyn CorpusAccessor {
        self.corpus.as_ref()
    }

    /// Evaluate `node` and rank its score list.
    pub fn rank(&self, node: &QueryNode, model: &RetrievalModel) -> Result<ScoreList> {
        let mut ranked = evaluate(node, model, self.corpus())?
            .into_score_list()
            .ok_or_else(|| Error::structure(format!("{} does not produce a score list", node)))?;
        ranked.sort_and_truncate_to(self.corpus(), self.config.max_results)?;
        Ok(ranked)
    }

    pub fn evaluate_query(&self, query: &QueryLine) -> Result<QueryOutcome> {
        let start = Instant::now();
        let model = self.config.model.ranking_model();
        let original = self.parser.parse(&query.text)?;

        let Some(expander) = &self.expander else {
            let ranked = self.rank(&original, &model)?;
            log::info!("Query {}: {} documents in {:?}", query.id, ranked.len(), start.elapsed());
            return Ok(QueryOutcome { query_id: query.id, ranked, expansion: None });
        };

        let documents = match &self.feedback_rankings {
            Some(rankings) => {
                let entries = rankings.get(&query.id).map(Vec::as_slice).unwrap_or(&[]);
                expander.documents_from_ranking(entries, self.corpus())?
            }
            None => expander.documents_from_scores(&self.rank(&original, &model)?, self.corpus())?,
        };
        let expanded = expander.expand(&documents, self.corpus())?;

        let ranked = if expanded.children().is_empty() {
            log::warn!("Query {}: no expansion terms, keeping the original query", query.id);
            self.rank(&original, &model)?
        } else {
            self.rank(&expander.combine(original, expanded.clone())?, &model)?
        };
        log::info!("Query {}: {} documents after expansion in {:?}", query.id, ranked.len(), start.elapsed());

        Ok(QueryOutcome {
            query_id: query.id,
            ranked,
            expansion: Some(expanded),
        })
    }

    /// Evaluate every query, in parallel when configured. Outcomes keep the input order.
    pub fn evaluate_batch(&self, queries: &[QueryLine]) -> Result<Vec<QueryOutcome>> {
        if self.config.parallel {
            queries.par_iter()
                .map(|query| self.evaluate_query(query))
                .collect()
        } else {
            queries.iter()
                .map(|query| self.evaluate_query(query))
                .collect()
        }
    }

    /// Run the configured query file and write the ranking file.
    ///
    /// Sequential runs write each query as soon as it is ranked, so a failure leaves the
    /// earlier queries on disk.
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let queries = read_queries(&self.config.query_file_path)?;
        log::info!("Evaluating {} queries from {}", queries.len(), self.config.query_file_path.display());

        let output = BufWriter::new(File::create(&self.config.trec_eval_output_path)?);
        let mut writer = RankingWriter::new(output, self.config.run_id.clone());
        let mut expansion_writer = match self.config.feedback.as_ref().and_then(|f| f.expansion_query_file.as_ref()) {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        if let RetrievalModel::Letor(model) = self.config.model {
            self.run_letor(model, &queries, &mut writer)?;
        } else if self.config.parallel {
            for outcome in self.evaluate_batch(&queries)? {
                self.write_outcome(&outcome, &mut writer, expansion_writer.as_mut())?;
            }
        } else {
            for query in &queries {
                let outcome = self.evaluate_query(query)?;
                self.write_outcome(&outcome, &mut writer, expansion_writer.as_mut())?;
                writer.flush()?;
            }
        }

        writer.flush()?;
        if let Some(expansion_writer) = expansion_writer.as_mut() {
            expansion_writer.flush()?;
        }

        let elapsed = start.elapsed();
        log::info!("Total evaluation time: {:.3} seconds", elapsed.as_secs_f64());
        Ok(RunSummary { queries: queries.len(), elapsed })
    }

    fn write_outcome<W: Write, E: Write>(
        &self,
        outcome: &QueryOutcome,
        writer: &mut RankingWriter<W>,
        expansion_writer: Option<&mut E>,
    ) -> Result<()> {
        writer.write_query(outcome.query_id, &outcome.ranked, self.corpus())?;
        if let (Some(expansion_writer), Some(expansion)) = (expansion_writer, &outcome.expansion) {
            writeln!(expansion_writer, "{}: {}", outcome.query_id, expansion)?;
        }
        Ok(())
    }

    fn run_letor<W: Write>(
        &self,
        model: LetorModel,
        queries: &[QueryLine],
        writer: &mut RankingWriter<W>,
    ) -> Result<()> {
        let letor = self.config.letor.as_ref()
            .ok_or_else(|| Error::invalid_argument("The letor model needs letor:* parameters"))?;
        let ranker = LetorRanker::new(letor, model, self.corpus())?;
        ranker.train()?;

        let initial: Vec<(QueryLine, ScoreList)> = queries.iter()
            .cloned()
            .zip(self.evaluate_batch(queries)?.into_iter().map(|outcome| outcome.ranked))
            .collect();
        for (query_id, ranked) in ranker.rerank(&initial, self.config.max_results)? {
            writer.write_query(query_id, &ranked, self.corpus())?;
        }
        Ok(())
    }
}
