//! Learning-to-rank features of (query, document) pairs.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, QueryId};
use crate::index::corpus::{CorpusAccessor, TermVector};
use crate::scoring::model::LetorModel;
use crate::scoring::scorer::corpus_probability;

pub const FEATURE_COUNT: usize = 18;

/// Fields scored by the per-field features, in feature order
pub const SCORED_FIELDS: [&str; 4] = ["body", "title", "url", "inlink"];

/// Features of one document; `None` where the document lacks the evidence (no such field,
/// no PageRank, disabled feature).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub values: [Option<f64>; FEATURE_COUNT],
}

impl Default for FeatureVector {
    fn default() -> Self {
        FeatureVector { values: [None; FEATURE_COUNT] }
    }
}

impl FeatureVector {
    /// Value of 1-based feature `number`.
    pub fn get(&self, number: usize) -> Option<f64> {
        self.values.get(number.wrapping_sub(1)).copied().flatten()
    }

    fn set(&mut self, number: usize, value: Option<f64>) {
        self.values[number - 1] = value;
    }
}

/// Enabled features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMask {
    enabled: [bool; FEATURE_COUNT],
}

impl Default for FeatureMask {
    fn default() -> Self {
        FeatureMask { enabled: [true; FEATURE_COUNT] }
    }
}

impl FeatureMask {
    /// Mask with the given 1-based features turned off; out-of-range numbers are ignored.
    pub fn disabling(disabled: &[usize]) -> Self {
        let mut mask = FeatureMask::default();
        for &number in disabled {
            if (1..=FEATURE_COUNT).contains(&number) {
                mask.enabled[number - 1] = false;
            }
        }
        mask
    }

    pub fn is_enabled(&self, number: usize) -> bool {
        (1..=FEATURE_COUNT).contains(&number) && self.enabled[number - 1]
    }

    pub fn enabled(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=FEATURE_COUNT).filter(|&number| self.is_enabled(number))
    }
}

/// Computes feature vectors against a corpus
pub struct FeatureExtractor {
    pub model: LetorModel,
    pub mask: FeatureMask,
    page_ranks: HashMap<String, f64>,
}

impl FeatureExtractor {
    pub fn new(model: LetorModel, mask: FeatureMask, page_ranks: HashMap<String, f64>) -> Self {
        FeatureExtractor { model, mask, page_ranks }
    }

    /// Features:
    ///  1 spam score, 2 URL depth, 3 from Wikipedia, 4 PageRank,
    ///  5-7 BM25 / Indri / term overlap on body, 8-10 on title, 11-13 on url,
    ///  14-16 on inlink, 17 inlink count, 18 ranked-Boolean body score.
    pub fn extract(&self, corpus: &dyn CorpusAccessor, doc_id: DocId, query_stems: &[String]) -> Result<FeatureVector> {
        let mut features = FeatureVector::default();
        let external_id = corpus.external_id(doc_id)?;

        let spam = match corpus.metadata(doc_id, "score")? {
            Some(raw) => Some(raw.trim().parse::<f64>()?),
            None => None,
        };
        features.set(1, spam);

        if let Some(url) = corpus.metadata(doc_id, "rawUrl")? {
            features.set(2, Some(url.matches('/').count() as f64));
            features.set(3, Some(if url.contains("wikipedia.org") { 1.0 } else { 0.0 }));
        }
        features.set(4, self.page_ranks.get(&external_id).copied());

        for (slot, field) in SCORED_FIELDS.iter().enumerate() {
            let Some(vector) = field_vector(corpus, field, doc_id)? else {
                continue;
            };
            let first = 5 + slot * 3;
            features.set(first, Some(self.bm25(corpus, &vector, query_stems)?));
            features.set(first + 1, Some(self.indri(corpus, &vector, query_stems)?));
            features.set(first + 2, Some(term_overlap(&vector, query_stems)));

            if *field == "inlink" {
                features.set(17, Some(vector.stems_len() as f64));
            }
            if *field == "body" {
                let matched_tf: u32 = query_stems.iter().map(|stem| vector.term_freq(stem)).sum();
                features.set(18, Some(matched_tf as f64));
            }
        }

        for number in 1..=FEATURE_COUNT {
            if !self.mask.is_enabled(number) {
                features.set(number, None);
            }
        }
        Ok(features)
    }

    fn bm25(&self, corpus: &dyn CorpusAccessor, vector: &TermVector, query_stems: &[String]) -> Result<f64> {
        let params = self.model.bm25;
        let doc_count = corpus.document_count(&vector.field)?;
        let avg_doc_length = corpus.average_document_length(&vector.field)?;
        let user_weight = params.user_weight(1.0);

        Ok(query_stems.iter()
            .filter_map(|stem| vector.get(stem))
            .map(|entry| {
                params.idf(doc_count, entry.doc_freq)
                    * params.normalized_tf(entry.term_freq, vector.length, avg_doc_length)
                    * user_weight
            })
            .sum())
    }

    /// Mean log-likelihood of the query stems; 0 when the document has none of them.
    fn indri(&self, corpus: &dyn CorpusAccessor, vector: &TermVector, query_stems: &[String]) -> Result<f64> {
        if query_stems.is_empty() || !query_stems.iter().any(|stem| vector.contains(stem)) {
            return Ok(0.0);
        }
        let params = self.model.indri;
        let total_terms = corpus.total_term_count(&vector.field)?;

        let mut sum = 0.0;
        for stem in query_stems {
            let ctf = match vector.get(stem) {
                Some(entry) => entry.corpus_term_freq,
                None => corpus.corpus_term_frequency(&vector.field, stem)?,
            };
            sum += params.score(vector.term_freq(stem), vector.length, corpus_probability(ctf, total_terms));
        }
        Ok(sum / query_stems.len() as f64)
    }
}

/// Term vector of `field`, or `None` when the document has no such field.
fn field_vector(corpus: &dyn CorpusAccessor, field: &str, doc_id: DocId) -> Result<Option<TermVector>> {
    if corpus.document_count(field)? == 0 {
        return Ok(None);
    }
    let vector = corpus.term_vector(field, doc_id)?;
    Ok(if vector.length == 0 { None } else { Some(vector) })
}

fn term_overlap(vector: &TermVector, query_stems: &[String]) -> f64 {
    if query_stems.is_empty() {
        return 0.0;
    }
    let matched = query_stems.iter().filter(|stem| vector.contains(stem)).count();
    matched as f64 / query_stems.len() as f64
}

/// Min-max normalise each feature across one query's documents. Missing values, and
/// features constant across the query, become 0.
pub fn normalize(vectors: &[FeatureVector]) -> Vec<[f64; FEATURE_COUNT]> {
    let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); FEATURE_COUNT];
    for vector in vectors {
        for (bound, value) in bounds.iter_mut().zip(&vector.values) {
            if let Some(value) = value {
                bound.0 = bound.0.min(*value);
                bound.1 = bound.1.max(*value);
            }
        }
    }

    vectors.iter()
        .map(|vector| {
            let mut normalized = [0.0; FEATURE_COUNT];
            for ((slot, value), (min, max)) in normalized.iter_mut().zip(&vector.values).zip(&bounds) {
                if let Some(value) = value {
                    let range = max - min;
                    if range > 0.0 {
                        *slot = (value - min) / range;
                    }
                }
            }
            normalized
        })
        .collect()
}

/// Training or test instance of one query
#[derive(Debug, Clone, PartialEq)]
pub struct RankInstance {
    pub doc_id: DocId,
    pub external_id: String,
    pub label: f64,  // Relevance for training, 0 for test
    pub features: FeatureVector,
}

/// Write `<label> qid:<id> 1:<v1> ... # <external_id>` lines, features normalised per query.
/// Disabled features are left out.
pub fn write_feature_file(path: &Path, groups: &[(QueryId, Vec<RankInstance>)], mask: &FeatureMask) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_features(&mut writer, groups, mask)?;
    writer.flush()?;
    Ok(())
}

pub fn write_features<W: Write>(writer: &mut W, groups: &[(QueryId, Vec<RankInstance>)], mask: &FeatureMask) -> Result<()> {
    for (query_id, instances) in groups {
        let vectors: Vec<FeatureVector> = instances.iter().map(|i| i.features).collect();
        for (instance, values) in instances.iter().zip(normalize(&vectors)) {
            write!(writer, "{} qid:{}", instance.label, query_id)?;
            for number in mask.enabled() {
                write!(writer, " {}:{:.6}", number, values[number - 1])?;
            }
            writeln!(writer, " # {}", instance.external_id)?;
        }
    }
    Ok(())
}

/// One score per non-empty line, in feature-file order.
pub fn read_scores(path: &Path) -> Result<Vec<f64>> {
    let reader = BufReader::new(File::open(path)?);
    let mut scores = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        scores.push(line.parse::<f64>()?);
    }
    Ok(scores)
}

/// `<external_id> <pagerank>` per line
pub fn read_page_ranks(path: &Path) -> Result<HashMap<String, f64>> {
    let reader = BufReader::new(File::open(path)?);
    let mut page_ranks = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let (Some(external_id), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        page_ranks.insert(external_id.to_string(), value.parse::<f64>()?);
    }
    Ok(page_ranks)
}

/// Relevance judgments `<qid> <ignored> <external_id> <relevance>`, grouped by query in
/// file order.
pub fn read_qrels(path: &Path) -> Result<HashMap<QueryId, Vec<(String, f64)>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut qrels: HashMap<QueryId, Vec<(String, f64)>> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 4 {
            return Err(Error::parse(format!("Relevance judgment needs 4 fields: '{}'", line)));
        }
        qrels.entry(fields[0].parse()?)
            .or_default()
            .push((fields[2].to_string(), fields[3].parse()?));
    }
    Ok(qrels)
}
