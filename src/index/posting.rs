use serde::{Serialize, Deserialize};
use crate::core::types::DocId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,       // Term frequency in document
    pub positions: Vec<u32>,  // Ascending token offsets
}

impl Posting {
    pub fn new(doc_id: DocId, positions: Vec<u32>) -> Self {
        Posting {
            doc_id,
            term_freq: positions.len() as u32,
            positions,
        }
    }
}

/// Postings for one term (or one proximity/synonym expression) in one field.
/// Note: Sorted ascending by doc_id; every operator relies on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedList {
    pub field: String,
    pub ctf: u64,             // Corpus term frequency
    pub postings: Vec<Posting>,
}

impl InvertedList {
    pub fn new(field: impl Into<String>) -> Self {
        InvertedList {
            field: field.into(),
            ctf: 0,
            postings: Vec::new(),
        }
    }

    /// Append a posting for a document greater than every document already present.
    /// Empty position lists are ignored.
    pub fn append_posting(&mut self, doc_id: DocId, positions: Vec<u32>) {
        if positions.is_empty() {
            return;
        }
        debug_assert!(self.postings.last().is_none_or(|last| last.doc_id < doc_id));
        self.ctf += positions.len() as u64;
        self.postings.push(Posting::new(doc_id, positions));
    }

    pub fn doc_freq(&self) -> usize {
        self.postings.len()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn doc_id(&self, index: usize) -> DocId {
        self.postings[index].doc_id
    }

    pub fn term_freq(&self, index: usize) -> u32 {
        self.postings[index].term_freq
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.postings.iter().map(|p| p.doc_id)
    }
}
