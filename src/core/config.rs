use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::core::error::{Error, ErrorKind, Result};
use crate::letor::features::FEATURE_COUNT;
use crate::scoring::model::{Bm25Params, IndriParams, LetorModel, ModelKind, RetrievalModel};
use crate::search::results::MAX_RESULTS;

/// Raw `key=value` pairs of a parameter file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<String, String>,
}

impl Parameters {
    /// One pair per line; blank lines and `#` comments are skipped, keys and values trimmed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::parse(format!(
                    "Line {} of parameter file is not key=value: '{}'", number + 1, line
                )));
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Parameters { values })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::new(ErrorKind::Io, format!("Cannot read parameter file {}: {}", path.display(), e)))?;
        Parameters::parse(&text)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::invalid_argument(format!("Required parameter '{}' is missing", key)))
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => parse_value(key, raw),
            None => Ok(default),
        }
    }

    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(Error::parse(format!("Invalid boolean '{}' for {}", other, key))),
        }
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    fn require_path(&self, key: &str) -> Result<PathBuf> {
        self.require(key).map(PathBuf::from)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::parse(format!("Invalid value '{}' for {}: {}", raw, key, e)))
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub index_path: PathBuf,
    pub query_file_path: PathBuf,
    pub trec_eval_output_path: PathBuf,
    pub model: RetrievalModel,
    pub run_id: String,                    // Last column of the ranking file
    pub max_results: usize,                // Documents kept per query
    pub parallel: bool,                    // Evaluate queries on the rayon pool
    pub feedback: Option<FeedbackConfig>,  // Set when fb=true
    pub letor: Option<LetorConfig>,        // Set for the letor model
}

impl Default for Config {
    fn default() -> Self {
        Config {
            index_path: PathBuf::from("./index"),
            query_file_path: PathBuf::from("./queries.txt"),
            trec_eval_output_path: PathBuf::from("./ranking.teIn"),
            model: RetrievalModel::Bm25(Bm25Params::default()),
            run_id: "run-1".to_string(),
            max_results: MAX_RESULTS,
            parallel: false,
            feedback: None,
            letor: None,
        }
    }
}

/// Pseudo-relevance feedback settings
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    pub docs: usize,                                 // fbDocs
    pub terms: usize,                                // fbTerms
    pub mu: f64,                                     // fbMu
    pub orig_weight: f64,                            // fbOrigWeight, in [0, 1]
    pub initial_ranking_file: Option<PathBuf>,       // Seed ranking instead of a first retrieval
    pub expansion_query_file: Option<PathBuf>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        FeedbackConfig {
            docs: 10,
            terms: 10,
            mu: 0.0,
            orig_weight: 0.5,
            initial_ranking_file: None,
            expansion_query_file: None,
        }
    }
}

/// Learning-to-rank settings
#[derive(Debug, Clone, PartialEq)]
pub struct LetorConfig {
    pub training_query_file: PathBuf,
    pub training_qrels_file: PathBuf,
    pub training_feature_vectors_file: PathBuf,
    pub page_rank_file: Option<PathBuf>,
    pub disabled_features: Vec<usize>,  // 1-based feature numbers
    pub svm_rank_learn_path: PathBuf,
    pub svm_rank_classify_path: PathBuf,
    pub svm_rank_param_c: f64,
    pub svm_rank_model_file: PathBuf,
    pub testing_feature_vectors_file: PathBuf,
    pub testing_document_scores: PathBuf,
}

impl LetorConfig {
    pub fn from_params(params: &Parameters) -> Result<Self> {
        let disabled_features = match params.get("letor:featureDisable") {
            Some(raw) => parse_feature_list(raw)?,
            None => Vec::new(),
        };
        Ok(LetorConfig {
            training_query_file: params.require_path("letor:trainingQueryFile")?,
            training_qrels_file: params.require_path("letor:trainingQrelsFile")?,
            training_feature_vectors_file: params.require_path("letor:trainingFeatureVectorsFile")?,
            page_rank_file: params.path("letor:pageRankFile"),
            disabled_features,
            svm_rank_learn_path: params.require_path("letor:svmRankLearnPath")?,
            svm_rank_classify_path: params.require_path("letor:svmRankClassifyPath")?,
            svm_rank_param_c: params.parse_or("letor:svmRankParamC", 0.001)?,
            svm_rank_model_file: params.require_path("letor:svmRankModelFile")?,
            testing_feature_vectors_file: params.require_path("letor:testingFeatureVectorsFile")?,
            testing_document_scores: params.require_path("letor:testingDocumentScores")?,
        })
    }
}

fn parse_feature_list(raw: &str) -> Result<Vec<usize>> {
    let mut features = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let feature: usize = parse_value("letor:featureDisable", item)?;
        if feature == 0 || feature > FEATURE_COUNT {
            return Err(Error::invalid_argument(format!(
                "Feature {} is outside 1..={}", feature, FEATURE_COUNT
            )));
        }
        features.push(feature);
    }
    Ok(features)
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Config::from_params(&Parameters::from_file(path)?)?;
        log::info!("Loaded parameters from {}", path.display());
        Ok(config)
    }

    /// Build and validate a configuration; the model name is resolved here, not at first use.
    pub fn from_params(params: &Parameters) -> Result<Self> {
        let defaults = Config::default();
        let kind: ModelKind = params.require("retrievalAlgorithm")?.parse()?;

        let bm25_defaults = Bm25Params::default();
        let bm25 = Bm25Params {
            k1: params.parse_or("BM25:k_1", bm25_defaults.k1)?,
            b: params.parse_or("BM25:b", bm25_defaults.b)?,
            k3: params.parse_or("BM25:k_3", bm25_defaults.k3)?,
        };
        let indri_defaults = IndriParams::default();
        let indri = IndriParams {
            mu: params.parse_or("Indri:mu", indri_defaults.mu)?,
            lambda: params.parse_or("Indri:lambda", indri_defaults.lambda)?,
        };

        let feedback = if params.flag("fb")? {
            let fb_defaults = FeedbackConfig::default();
            Some(FeedbackConfig {
                docs: params.parse_or("fbDocs", fb_defaults.docs)?,
                terms: params.parse_or("fbTerms", fb_defaults.terms)?,
                mu: params.parse_or("fbMu", fb_defaults.mu)?,
                orig_weight: params.parse_or("fbOrigWeight", fb_defaults.orig_weight)?,
                initial_ranking_file: params.path("fbInitialRankingFile"),
                expansion_query_file: params.path("fbExpansionQueryFile"),
            })
        } else {
            None
        };

        let letor = match kind {
            ModelKind::Letor => Some(LetorConfig::from_params(params)?),
            _ => None,
        };

        let config = Config {
            index_path: params.require_path("indexPath")?,
            query_file_path: params.require_path("queryFilePath")?,
            trec_eval_output_path: params.require_path("trecEvalOutputPath")?,
            model: RetrievalModel::from_kind(kind, bm25, indri),
            run_id: params.get("runId").map(String::from).unwrap_or(defaults.run_id),
            max_results: params.parse_or("maxResults", defaults.max_results)?,
            parallel: params.flag("parallel")?,
            feedback,
            letor,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.model {
            RetrievalModel::Bm25(params) | RetrievalModel::Letor(LetorModel { bm25: params, .. }) => {
                if params.k1 < 0.0 || params.k3 < 0.0 || !(0.0..=1.0).contains(&params.b) {
                    return Err(Error::invalid_argument(format!(
                        "BM25 needs k_1 >= 0, k_3 >= 0 and 0 <= b <= 1, got {:?}", params
                    )));
                }
            }
            RetrievalModel::Indri(_) | RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => {}
        }

        if let RetrievalModel::Indri(params) | RetrievalModel::Letor(LetorModel { indri: params, .. }) = self.model {
            // mu > 0 keeps the smoothed estimate defined for empty fields
            if params.mu == 0 || !(0.0..=1.0).contains(&params.lambda) {
                return Err(Error::invalid_argument(format!(
                    "Indri needs mu > 0 and 0 <= lambda <= 1, got {:?}", params
                )));
            }
        }

        if self.max_results == 0 {
            return Err(Error::invalid_argument("maxResults must be positive"));
        }

        if let Some(feedback) = &self.feedback {
            // The expanded query is a weighted AND, which only Indri evaluates
            if !matches!(self.model, RetrievalModel::Indri(_)) {
                return Err(Error::invalid_argument(format!(
                    "Query expansion needs the Indri model, not {}", self.model.kind()
                )));
            }
            if feedback.docs == 0 || feedback.terms == 0 {
                return Err(Error::invalid_argument("fbDocs and fbTerms must be positive"));
            }
            if !(0.0..=1.0).contains(&feedback.orig_weight) {
                return Err(Error::invalid_argument(format!(
                    "fbOrigWeight must be in [0, 1], got {}", feedback.orig_weight
                )));
            }
            if feedback.mu < 0.0 {
                return Err(Error::invalid_argument("fbMu must not be negative"));
            }
        }
        Ok(())
    }
}
