use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::analysis::analyzer::Analyzer;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::posting::{InvertedList, Posting};

/// Read-only view of an indexed corpus.
///
/// Every evaluation receives the accessor explicitly; implementations must tolerate
/// concurrent reads when queries are evaluated in parallel.
pub trait CorpusAccessor: Send + Sync {
    /// Postings of `term` in `field`. Unknown terms yield an empty list.
    fn postings(&self, field: &str, term: &str) -> Result<InvertedList>;

    fn corpus_term_frequency(&self, field: &str, term: &str) -> Result<u64>;

    fn document_frequency(&self, field: &str, term: &str) -> Result<u64> {
        Ok(self.postings(field, term)?.doc_freq() as u64)
    }

    /// Number of documents that have a non-empty `field`.
    fn document_count(&self, field: &str) -> Result<u64>;

    /// Sum of all document lengths in `field`.
    fn total_term_count(&self, field: &str) -> Result<u64>;

    fn document_length(&self, field: &str, doc_id: DocId) -> Result<u64>;

    fn external_id(&self, doc_id: DocId) -> Result<String>;

    /// Fails with `NotFound` when no document carries `external_id`.
    fn internal_id(&self, external_id: &str) -> Result<DocId>;

    fn term_vector(&self, field: &str, doc_id: DocId) -> Result<TermVector>;

    /// Stored, unindexed document attribute (e.g. `rawUrl`).
    fn metadata(&self, doc_id: DocId, key: &str) -> Result<Option<String>>;

    fn average_document_length(&self, field: &str) -> Result<f64> {
        let docs = self.document_count(field)?;
        if docs == 0 {
            return Ok(0.0);
        }
        Ok(self.total_term_count(field)? as f64 / docs as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermVectorEntry {
    pub stem: String,
    pub term_freq: u32,          // Occurrences in this document
    pub corpus_term_freq: u64,   // Occurrences in the whole field
    pub doc_freq: u64,
}

/// Per-document term statistics for one field, sorted by stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    pub doc_id: DocId,
    pub field: String,
    pub length: u64,
    pub entries: Vec<TermVectorEntry>,
}

impl TermVector {
    pub fn stems_len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, stem: &str) -> Option<&TermVectorEntry> {
        self.entries
            .binary_search_by(|entry| entry.stem.as_str().cmp(stem))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn term_freq(&self, stem: &str) -> u32 {
        self.get(stem).map(|entry| entry.term_freq).unwrap_or(0)
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.get(stem).is_some()
    }

    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.stem.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FieldIndex {
    postings: HashMap<String, Vec<Posting>>,  // Sorted by doc_id
    doc_lengths: Vec<u64>,                     // Indexed by doc id
    doc_terms: Vec<Vec<(String, u32)>>,        // Indexed by doc id, sorted by term
    doc_count: u64,
    total_terms: u64,
}

impl FieldIndex {
    fn ctf(&self, term: &str) -> u64 {
        self.postings
            .get(term)
            .map(|postings| postings.iter().map(|p| p.term_freq as u64).sum())
            .unwrap_or(0)
    }
}

/// In-memory, read-only corpus loaded from a snapshot or assembled from tokenised documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCorpus {
    fields: HashMap<String, FieldIndex>,
    external_ids: Vec<String>,
    internal_ids: HashMap<String, DocId>,
    metadata: Vec<HashMap<String, String>>,
}

impl MemoryCorpus {
    pub fn builder() -> MemoryCorpusBuilder {
        MemoryCorpusBuilder::new()
    }

    pub fn num_documents(&self) -> usize {
        self.external_ids.len()
    }

    /// Load a snapshot; `.json` files are read as JSON, anything else as bincode.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::new(ErrorKind::Io, format!("Cannot open corpus {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);

        let corpus = if is_json(path) {
            serde_json::from_reader(reader)?
        } else {
            bincode::deserialize_from(reader)?
        };
        Ok(corpus)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        if is_json(path) {
            serde_json::to_writer(writer, self)?;
        } else {
            bincode::serialize_into(writer, self)?;
        }
        Ok(())
    }

    fn field(&self, field: &str) -> Option<&FieldIndex> {
        self.fields.get(field)
    }

    fn check_doc(&self, doc_id: DocId) -> Result<usize> {
        let index = doc_id.value() as usize;
        if index < self.external_ids.len() {
            Ok(index)
        } else {
            Err(Error::not_found(format!("Document {} does not exist", doc_id)))
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl CorpusAccessor for MemoryCorpus {
    fn postings(&self, field: &str, term: &str) -> Result<InvertedList> {
        let mut list = InvertedList::new(field);
        if let Some(postings) = self.field(field).and_then(|f| f.postings.get(term)) {
            list.ctf = postings.iter().map(|p| p.term_freq as u64).sum();
            list.postings = postings.clone();
        }
        Ok(list)
    }

    fn corpus_term_frequency(&self, field: &str, term: &str) -> Result<u64> {
        Ok(self.field(field).map(|f| f.ctf(term)).unwrap_or(0))
    }

    fn document_frequency(&self, field: &str, term: &str) -> Result<u64> {
        Ok(self.field(field)
            .and_then(|f| f.postings.get(term))
            .map(|postings| postings.len() as u64)
            .unwrap_or(0))
    }

    fn document_count(&self, field: &str) -> Result<u64> {
        Ok(self.field(field).map(|f| f.doc_count).unwrap_or(0))
    }

    fn total_term_count(&self, field: &str) -> Result<u64> {
        Ok(self.field(field).map(|f| f.total_terms).unwrap_or(0))
    }

    fn document_length(&self, field: &str, doc_id: DocId) -> Result<u64> {
        let index = self.check_doc(doc_id)?;
        Ok(self.field(field)
            .and_then(|f| f.doc_lengths.get(index).copied())
            .unwrap_or(0))
    }

    fn external_id(&self, doc_id: DocId) -> Result<String> {
        let index = self.check_doc(doc_id)?;
        Ok(self.external_ids[index].clone())
    }

    fn internal_id(&self, external_id: &str) -> Result<DocId> {
        self.internal_ids
            .get(external_id)
            .copied()
            .ok_or_else(|| Error::not_found(format!("External id '{}' not found", external_id)))
    }

    fn term_vector(&self, field: &str, doc_id: DocId) -> Result<TermVector> {
        let index = self.check_doc(doc_id)?;
        let Some(field_index) = self.field(field) else {
            return Err(Error::not_found(format!("Field '{}' is not indexed", field)));
        };

        let terms = field_index.doc_terms.get(index).map(Vec::as_slice).unwrap_or(&[]);
        let entries = terms.iter()
            .map(|(stem, tf)| {
                let postings = field_index.postings.get(stem);
                TermVectorEntry {
                    stem: stem.clone(),
                    term_freq: *tf,
                    corpus_term_freq: field_index.ctf(stem),
                    doc_freq: postings.map(|p| p.len() as u64).unwrap_or(0),
                }
            })
            .collect();

        Ok(TermVector {
            doc_id,
            field: field.to_string(),
            length: field_index.doc_lengths.get(index).copied().unwrap_or(0),
            entries,
        })
    }

    fn metadata(&self, doc_id: DocId, key: &str) -> Result<Option<String>> {
        let index = self.check_doc(doc_id)?;
        Ok(self.metadata[index].get(key).cloned())
    }
}

/// Assembles a `MemoryCorpus` from documents that are already tokenised.
pub struct MemoryCorpusBuilder {
    corpus: MemoryCorpus,
}

impl MemoryCorpusBuilder {
    pub fn new() -> Self {
        MemoryCorpusBuilder {
            corpus: MemoryCorpus::default(),
        }
    }

    /// Add a document whose fields are token sequences; a token's position is its index.
    pub fn add_document<F, T>(&mut self, external_id: &str, fields: F) -> Result<DocId>
    where
        F: IntoIterator<Item = (T, Vec<String>)>,
        T: Into<String>,
    {
        let positioned = fields.into_iter()
            .map(|(field, tokens)| {
                let tokens = tokens.into_iter()
                    .enumerate()
                    .map(|(position, token)| (position as u32, token))
                    .collect();
                (field.into(), tokens)
            })
            .collect::<Vec<(String, Vec<(u32, String)>)>>();
        self.add_positioned(external_id, positioned)
    }

    /// Add a document by running each field's raw text through `analyzer`.
    pub fn add_text(&mut self, external_id: &str, fields: &[(&str, &str)], analyzer: &Analyzer) -> Result<DocId> {
        let positioned = fields.iter()
            .map(|(field, text)| {
                let tokens = analyzer.analyze(text)
                    .into_iter()
                    .map(|token| (token.position, token.text))
                    .collect();
                (field.to_string(), tokens)
            })
            .collect();
        self.add_positioned(external_id, positioned)
    }

    pub fn set_metadata(&mut self, doc_id: DocId, key: &str, value: &str) -> Result<()> {
        let index = self.corpus.check_doc(doc_id)?;
        self.corpus.metadata[index].insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_positioned(&mut self, external_id: &str, fields: Vec<(String, Vec<(u32, String)>)>) -> Result<DocId> {
        if self.corpus.internal_ids.contains_key(external_id) {
            return Err(Error::invalid_argument(format!("Duplicate external id '{}'", external_id)));
        }
        let mut seen = HashSet::new();
        if let Some((field, _)) = fields.iter().find(|(field, _)| !seen.insert(field.as_str())) {
            return Err(Error::invalid_argument(format!(
                "Document '{}' lists field '{}' more than once", external_id, field
            )));
        }

        let doc_id = DocId(self.corpus.external_ids.len() as u64);
        let index = doc_id.value() as usize;
        self.corpus.external_ids.push(external_id.to_string());
        self.corpus.internal_ids.insert(external_id.to_string(), doc_id);
        self.corpus.metadata.push(HashMap::new());

        for (field, tokens) in fields {
            let field_index = self.corpus.fields.entry(field).or_default();
            field_index.doc_lengths.resize(index + 1, 0);
            field_index.doc_terms.resize(index + 1, Vec::new());
            if tokens.is_empty() {
                continue;
            }

            // Group positions by term
            let mut term_positions: HashMap<String, Vec<u32>> = HashMap::new();
            for (position, term) in &tokens {
                term_positions.entry(term.clone())
                    .or_default()
                    .push(*position);
            }

            let mut doc_terms = Vec::with_capacity(term_positions.len());
            for (term, mut positions) in term_positions {
                positions.sort_unstable();
                doc_terms.push((term.clone(), positions.len() as u32));
                // Documents arrive in id order, so appending keeps postings sorted
                field_index.postings.entry(term)
                    .or_default()
                    .push(Posting::new(doc_id, positions));
            }
            doc_terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

            field_index.doc_lengths[index] += tokens.len() as u64;
            field_index.doc_terms[index] = doc_terms;
            field_index.doc_count += 1;
            field_index.total_terms += tokens.len() as u64;
        }

        Ok(doc_id)
    }

    pub fn build(mut self) -> MemoryCorpus {
        let num_docs = self.corpus.external_ids.len();
        for field_index in self.corpus.fields.values_mut() {
            field_index.doc_lengths.resize(num_docs, 0);
            field_index.doc_terms.resize(num_docs, Vec::new());
        }
        self.corpus
    }
}

impl Default for MemoryCorpusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn sample() -> MemoryCorpus {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("d0", vec![("body", tokens("apple banana apple"))]).unwrap();
        builder.add_document("d1", vec![("body", tokens("banana cherry")), ("title", tokens("fruit"))]).unwrap();
        builder.add_document("d2", vec![("title", tokens("apple"))]).unwrap();
        builder.build()
    }

    #[test]
    fn postings_are_sorted_with_positions() {
        let corpus = sample();
        let list = corpus.postings("body", "banana").unwrap();
        assert_eq!(list.doc_ids().collect::<Vec<_>>(), vec![DocId(0), DocId(1)]);
        assert_eq!(list.postings[0].positions, vec![1]);
        assert_eq!(list.postings[1].positions, vec![0]);
        assert_eq!(list.ctf, 2);

        let apple = corpus.postings("body", "apple").unwrap();
        assert_eq!(apple.postings[0].positions, vec![0, 2]);
        assert_eq!(apple.term_freq(0), 2);
    }

    #[test]
    fn repeated_field_is_rejected() {
        let mut builder = MemoryCorpus::builder();
        let err = builder.add_document("d0", vec![("body", tokens("apple")), ("body", tokens("banana"))]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        // The rejected document leaves no trace, so its id can be reused
        builder.add_document("d0", vec![("body", tokens("apple banana"))]).unwrap();
        let corpus = builder.build();
        assert_eq!(corpus.num_documents(), 1);
        assert_eq!(corpus.postings("body", "banana").unwrap().doc_ids().collect::<Vec<_>>(), vec![DocId(0)]);
    }

    #[test]
    fn field_statistics() {
        let corpus = sample();
        assert_eq!(corpus.document_count("body").unwrap(), 2);
        assert_eq!(corpus.total_term_count("body").unwrap(), 5);
        assert_eq!(corpus.document_length("body", DocId(2)).unwrap(), 0);
        assert_eq!(corpus.corpus_term_frequency("body", "apple").unwrap(), 2);
        assert_eq!(corpus.document_frequency("title", "apple").unwrap(), 1);
        assert!((corpus.average_document_length("body").unwrap() - 2.5).abs() < 1e-12);
        assert!(corpus.postings("missing", "apple").unwrap().is_empty());
    }

    #[test]
    fn id_mapping_round_trips_and_reports_missing() {
        let corpus = sample();
        assert_eq!(corpus.internal_id("d1").unwrap(), DocId(1));
        assert_eq!(corpus.external_id(DocId(2)).unwrap(), "d2");

        let err = corpus.internal_id("nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(corpus.external_id(DocId(9)).is_err());
    }

    #[test]
    fn term_vector_lists_document_terms() {
        let corpus = sample();
        let vector = corpus.term_vector("body", DocId(0)).unwrap();
        assert_eq!(vector.length, 3);
        assert_eq!(vector.stems().collect::<Vec<_>>(), vec!["apple", "banana"]);
        assert_eq!(vector.term_freq("apple"), 2);
        assert_eq!(vector.get("banana").unwrap().corpus_term_freq, 2);
        assert_eq!(vector.term_freq("cherry"), 0);
    }

    #[test]
    fn duplicate_external_ids_are_rejected() {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("x", vec![("body", tokens("a"))]).unwrap();
        assert!(builder.add_document("x", vec![("body", tokens("b"))]).is_err());
    }

    #[test]
    fn snapshot_round_trip() {
        let corpus = sample();
        let dir = tempfile::tempdir().unwrap();

        for name in ["corpus.bin", "corpus.json"] {
            let path = dir.path().join(name);
            corpus.save(&path).unwrap();
            let loaded = MemoryCorpus::load(&path).unwrap();
            assert_eq!(loaded.num_documents(), 3);
            assert_eq!(loaded.postings("body", "apple").unwrap(), corpus.postings("body", "apple").unwrap());
        }
    }
}
