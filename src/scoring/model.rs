use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::query::ast::{OperatorKind, QueryNode};

/// BM25 parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,  // Term frequency saturation (default: 1.2)
    pub b: f64,   // Length normalization strength (default: 0.75)
    pub k3: f64,  // Query term frequency saturation (default: 0)
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params {
            k1: 1.2,
            b: 0.75,
            k3: 0.0,
        }
    }
}

impl Bm25Params {
    /// RSJ idf. Negative for terms occurring in more than half the documents.
    pub fn idf(&self, doc_count: u64, doc_freq: u64) -> f64 {
        let n = doc_count as f64;
        let df = doc_freq as f64;
        ((n - df + 0.5) / (df + 0.5)).ln()
    }

    pub fn normalized_tf(&self, tf: u32, doc_length: u64, avg_doc_length: f64) -> f64 {
        let tf = tf as f64;
        let length_ratio = if avg_doc_length > 0.0 {
            doc_length as f64 / avg_doc_length
        } else {
            1.0
        };
        tf / (tf + self.k1 * (1.0 - self.b + self.b * length_ratio))
    }

    /// Query-side weight; `qtf` is the term's frequency in the query.
    pub fn user_weight(&self, qtf: f64) -> f64 {
        (self.k3 + 1.0) * qtf / (self.k3 + qtf)
    }
}

/// Indri query-likelihood parameters (Dirichlet + Jelinek-Mercer two-stage smoothing)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndriParams {
    pub mu: u32,
    pub lambda: f64,
}

impl Default for IndriParams {
    fn default() -> Self {
        IndriParams {
            mu: 2500,
            lambda: 0.4,
        }
    }
}

impl IndriParams {
    /// Log-probability of a term occurring `tf` times in a document of `doc_length` tokens,
    /// given its background probability `p_c`.
    pub fn score(&self, tf: u32, doc_length: u64, p_c: f64) -> f64 {
        let mu = self.mu as f64;
        let smoothed = (tf as f64 + mu * p_c) / (doc_length as f64 + mu);
        (self.lambda * smoothed + (1.0 - self.lambda) * p_c).ln()
    }

    /// Score of a document that does not contain the term: pure background estimate.
    pub fn default_score(&self, doc_length: u64, p_c: f64) -> f64 {
        self.score(0, doc_length, p_c)
    }
}

/// Parameters carried by the learning-to-rank model for its feature scorers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LetorModel {
    pub bm25: Bm25Params,
    pub indri: IndriParams,
}

/// Retrieval model names accepted by `retrievalAlgorithm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    UnrankedBoolean,
    RankedBoolean,
    Bm25,
    Indri,
    Letor,
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrankedboolean" => Ok(ModelKind::UnrankedBoolean),
            "rankedboolean" => Ok(ModelKind::RankedBoolean),
            "bm25" => Ok(ModelKind::Bm25),
            "indri" => Ok(ModelKind::Indri),
            "letor" => Ok(ModelKind::Letor),
            other => Err(Error::not_found(format!("Unknown retrieval model '{}'", other))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ModelKind::UnrankedBoolean => "UnrankedBoolean",
            ModelKind::RankedBoolean => "RankedBoolean",
            ModelKind::Bm25 => "BM25",
            ModelKind::Indri => "Indri",
            ModelKind::Letor => "letor",
        };
        f.write_str(name)
    }
}

/// Retrieval model fixed for a whole run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RetrievalModel {
    UnrankedBoolean,
    RankedBoolean,
    Bm25(Bm25Params),
    Indri(IndriParams),
    Letor(LetorModel),
}

impl RetrievalModel {
    /// Build a model from its parsed kind; parameters irrelevant to the kind are ignored.
    pub fn from_kind(kind: ModelKind, bm25: Bm25Params, indri: IndriParams) -> Self {
        match kind {
            ModelKind::UnrankedBoolean => RetrievalModel::UnrankedBoolean,
            ModelKind::RankedBoolean => RetrievalModel::RankedBoolean,
            ModelKind::Bm25 => RetrievalModel::Bm25(bm25),
            ModelKind::Indri => RetrievalModel::Indri(indri),
            ModelKind::Letor => RetrievalModel::Letor(LetorModel { bm25, indri }),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            RetrievalModel::UnrankedBoolean => ModelKind::UnrankedBoolean,
            RetrievalModel::RankedBoolean => ModelKind::RankedBoolean,
            RetrievalModel::Bm25(_) => ModelKind::Bm25,
            RetrievalModel::Indri(_) => ModelKind::Indri,
            RetrievalModel::Letor(_) => ModelKind::Letor,
        }
    }

    /// Operator wrapped around every parsed query.
    pub fn default_operator(&self) -> OperatorKind {
        match self {
            RetrievalModel::Bm25(_) | RetrievalModel::Letor(_) => OperatorKind::Sum,
            RetrievalModel::Indri(_) => OperatorKind::And,
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => OperatorKind::Or,
        }
    }

    /// Model used to produce the ranking that feedback or re-ranking starts from.
    pub fn ranking_model(&self) -> RetrievalModel {
        match self {
            RetrievalModel::Letor(letor) => RetrievalModel::Bm25(letor.bm25),
            other => *other,
        }
    }

    pub fn empty_query(&self) -> QueryNode {
        QueryNode::empty(self.default_operator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bm25_matches_reference_example() {
        let params = Bm25Params { k1: 1.2, b: 0.75, k3: 0.0 };
        let idf = params.idf(1000, 10);
        assert!((idf - 4.547).abs() < 1e-3);

        let norm_tf = params.normalized_tf(4, 200, 150.0);
        assert!((norm_tf - 4.0 / 5.5).abs() < 1e-9);

        let score = idf * norm_tf * params.user_weight(1.0);
        assert!((score - 3.307).abs() < 1e-3);
    }

    #[test]
    fn indri_default_score_is_finite() {
        let params = IndriParams { mu: 2500, lambda: 0.4 };
        let p_c = 500.0 / 1_000_000.0;
        let score = params.default_score(300, p_c);
        let expected = (0.4 * 2500.0 * 0.0005 / 2800.0 + 0.6 * 0.0005f64).ln();

        assert!(score.is_finite());
        assert!(score < 0.0);
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn model_names_parse_case_insensitively() {
        assert_eq!("bm25".parse::<ModelKind>().unwrap(), ModelKind::Bm25);
        assert_eq!("RankedBoolean".parse::<ModelKind>().unwrap(), ModelKind::RankedBoolean);
        assert_eq!("LETOR".parse::<ModelKind>().unwrap(), ModelKind::Letor);
        assert!("vector".parse::<ModelKind>().is_err());
    }

    #[test]
    fn default_operator_follows_model() {
        assert_eq!(RetrievalModel::Bm25(Bm25Params::default()).default_operator(), OperatorKind::Sum);
        assert_eq!(RetrievalModel::Indri(IndriParams::default()).default_operator(), OperatorKind::And);
        assert_eq!(RetrievalModel::UnrankedBoolean.default_operator(), OperatorKind::Or);
    }
}
