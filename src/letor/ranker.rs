use std::collections::HashMap;
use crate::analysis::analyzer::Analyzer;
use crate::core::config::LetorConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::QueryId;
use crate::index::corpus::CorpusAccessor;
use crate::letor::features::{
    read_page_ranks, read_qrels, read_scores, write_feature_file, FeatureExtractor, FeatureMask, RankInstance,
};
use crate::letor::svm_rank::SvmRank;
use crate::scoring::model::LetorModel;
use crate::search::results::{ScoreEntry, ScoreList};
use crate::search::trec::{read_queries, QueryLine};

/// Instances of one query, in ranking order
pub type QueryGroup = (QueryId, Vec<RankInstance>);

/// Trains an SVM-rank model on judged queries and re-ranks initial rankings with it
pub struct LetorRanker<'a> {
    config: &'a LetorConfig,
    corpus: &'a dyn CorpusAccessor,
    extractor: FeatureExtractor,
    svm: SvmRank,
    analyzer: Analyzer,
}

impl<'a> LetorRanker<'a> {
    pub fn new(config: &'a LetorConfig, model: LetorModel, corpus: &'a dyn CorpusAccessor) -> Result<Self> {
        let page_ranks = match &config.page_rank_file {
            Some(path) => read_page_ranks(path)?,
            None => HashMap::new(),
        };
        log::info!("Loaded {} PageRank scores", page_ranks.len());

        Ok(LetorRanker {
            config,
            corpus,
            extractor: FeatureExtractor::new(model, FeatureMask::disabling(&config.disabled_features), page_ranks),
            svm: SvmRank::new(
                config.svm_rank_learn_path.clone(),
                config.svm_rank_classify_path.clone(),
                config.svm_rank_param_c,
            ),
            analyzer: Analyzer::standard_english(),
        })
    }

    /// Write training features for the judged queries and train the model.
    pub fn train(&self) -> Result<()> {
        let queries = read_queries(&self.config.training_query_file)?;
        let qrels = read_qrels(&self.config.training_qrels_file)?;
        let groups = self.training_groups(&queries, &qrels)?;

        write_feature_file(&self.config.training_feature_vectors_file, &groups, &self.extractor.mask)?;
        self.svm.train(&self.config.training_feature_vectors_file, &self.config.svm_rank_model_file)
    }

    /// Re-rank each query's initial ranking with the trained model.
    pub fn rerank(&self, rankings: &[(QueryLine, ScoreList)], max_results: usize) -> Result<Vec<(QueryId, ScoreList)>> {
        let groups = self.test_groups(rankings)?;
        write_feature_file(&self.config.testing_feature_vectors_file, &groups, &self.extractor.mask)?;
        self.svm.classify(
            &self.config.testing_feature_vectors_file,
            &self.config.svm_rank_model_file,
            &self.config.testing_document_scores,
        )?;

        let scores = read_scores(&self.config.testing_document_scores)?;
        self.apply_scores(&groups, &scores, max_results)
    }

    fn query_stems(&self, text: &str) -> Vec<String> {
        self.analyzer.analyze_query(text)
    }

    /// Judged documents as training instances, labelled with their relevance. Judged
    /// documents missing from the corpus are skipped.
    pub fn training_groups(&self, queries: &[QueryLine], qrels: &HashMap<QueryId, Vec<(String, f64)>>) -> Result<Vec<QueryGroup>> {
        let mut groups = Vec::with_capacity(queries.len());
        for query in queries {
            let stems = self.query_stems(&query.text);
            let mut instances = Vec::new();

            for (external_id, label) in qrels.get(&query.id).map(Vec::as_slice).unwrap_or(&[]) {
                let doc_id = match self.corpus.internal_id(external_id) {
                    Ok(doc_id) => doc_id,
                    Err(e) if e.kind == ErrorKind::NotFound => {
                        log::warn!("Skipping judged document {} of query {}: not in corpus", external_id, query.id);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                instances.push(RankInstance {
                    doc_id,
                    external_id: external_id.clone(),
                    label: *label,
                    features: self.extractor.extract(self.corpus, doc_id, &stems)?,
                });
            }
            groups.push((query.id, instances));
        }
        Ok(groups)
    }

    /// Ranked documents as unlabelled test instances.
    pub fn test_groups(&self, rankings: &[(QueryLine, ScoreList)]) -> Result<Vec<QueryGroup>> {
        rankings.iter()
            .map(|(query, ranked)| {
                let stems = self.query_stems(&query.text);
                let instances = ranked.iter()
                    .map(|entry| {
                        let external_id = match ranked.cached_external_id(entry.doc_id) {
                            Some(id) => id.to_string(),
                            None => self.corpus.external_id(entry.doc_id)?,
                        };
                        Ok(RankInstance {
                            doc_id: entry.doc_id,
                            external_id,
                            label: 0.0,
                            features: self.extractor.extract(self.corpus, entry.doc_id, &stems)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((query.id, instances))
            })
            .collect()
    }

    /// Give every instance its classifier score, in feature-file order, and rank each query.
    pub fn apply_scores(&self, groups: &[QueryGroup], scores: &[f64], max_results: usize) -> Result<Vec<(QueryId, ScoreList)>> {
        let expected: usize = groups.iter().map(|(_, instances)| instances.len()).sum();
        if scores.len() != expected {
            return Err(Error::new(ErrorKind::InvalidState, format!(
                "Classifier produced {} scores for {} documents", scores.len(), expected
            )));
        }

        let mut scores = scores.iter().copied();
        let mut ranked = Vec::with_capacity(groups.len());
        for (query_id, instances) in groups {
            let entries = instances.iter()
                .zip(scores.by_ref())
                .map(|(instance, score)| ScoreEntry { doc_id: instance.doc_id, score })
                .collect();
            let mut list = ScoreList::from_entries(entries);
            list.sort_and_truncate_to(self.corpus, max_results)?;
            ranked.push((*query_id, list));
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::core::types::DocId;
    use crate::index::corpus::MemoryCorpus;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn corpus() -> MemoryCorpus {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("a", vec![("body", tokens("appl pie"))]).unwrap();
        builder.add_document("b", vec![("body", tokens("banana bread"))]).unwrap();
        builder.add_document("c", vec![("body", tokens("appl crumbl"))]).unwrap();
        builder.build()
    }

    fn config() -> LetorConfig {
        LetorConfig {
            training_query_file: PathBuf::from("train.qry"),
            training_qrels_file: PathBuf::from("train.qrels"),
            training_feature_vectors_file: PathBuf::from("train.vec"),
            page_rank_file: None,
            disabled_features: Vec::new(),
            svm_rank_learn_path: PathBuf::from("svm_rank_learn"),
            svm_rank_classify_path: PathBuf::from("svm_rank_classify"),
            svm_rank_param_c: 0.001,
            svm_rank_model_file: PathBuf::from("model.dat"),
            testing_feature_vectors_file: PathBuf::from("test.vec"),
            testing_document_scores: PathBuf::from("test.scores"),
        }
    }

    fn query(id: QueryId, text: &str) -> QueryLine {
        QueryLine { id, text: text.to_string() }
    }

    #[test]
    fn training_groups_skip_unknown_documents() {
        let corpus = corpus();
        let config = config();
        let ranker = LetorRanker::new(&config, LetorModel::default(), &corpus).unwrap();

        let mut qrels = HashMap::new();
        qrels.insert(1, vec![("a".to_string(), 2.0), ("zzz".to_string(), 1.0), ("b".to_string(), 0.0)]);
        let groups = ranker.training_groups(&[query(1, "apple"), query(2, "bread")], &qrels).unwrap();

        assert_eq!(groups.len(), 2);
        let labels: Vec<f64> = groups[0].1.iter().map(|i| i.label).collect();
        assert_eq!(labels, vec![2.0, 0.0]);
        assert_eq!(groups[0].1[0].features.get(7), Some(1.0));
        assert!(groups[1].1.is_empty());
    }

    #[test]
    fn classifier_scores_reorder_documents() {
        let corpus = corpus();
        let config = config();
        let ranker = LetorRanker::new(&config, LetorModel::default(), &corpus).unwrap();

        let mut initial = ScoreList::new();
        initial.add(DocId(0), 3.0);
        initial.add(DocId(2), 1.0);
        let groups = ranker.test_groups(&[(query(4, "apple"), initial)]).unwrap();
        assert_eq!(groups[0].1[1].external_id, "c");

        let reranked = ranker.apply_scores(&groups, &[-1.0, 0.5], 100).unwrap();
        let order: Vec<DocId> = reranked[0].1.iter().map(|e| e.doc_id).collect();
        assert_eq!(order, vec![DocId(2), DocId(0)]);

        let err = ranker.apply_scores(&groups, &[1.0], 100).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }
}
