use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::corpus::CorpusAccessor;
use crate::index::posting::InvertedList;

/// Number of entries kept by `ScoreList::sort_and_truncate`
pub const MAX_RESULTS: usize = 100;

/// Document with relevance score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub doc_id: DocId,
    pub score: f64,
}

/// Scored documents. Ascending by doc id while operators produce it; ranked after
/// `sort_and_truncate`.
#[derive(Debug, Clone, Default)]
pub struct ScoreList {
    entries: Vec<ScoreEntry>,
    external_ids: HashMap<DocId, String>,  // Filled lazily while ranking
}

impl ScoreList {
    pub fn new() -> Self {
        ScoreList::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ScoreList {
            entries: Vec::with_capacity(capacity),
            external_ids: HashMap::new(),
        }
    }

    pub fn from_entries(entries: Vec<ScoreEntry>) -> Self {
        ScoreList {
            entries,
            external_ids: HashMap::new(),
        }
    }

    pub fn add(&mut self, doc_id: DocId, score: f64) {
        self.entries.push(ScoreEntry { doc_id, score });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn doc_id(&self, index: usize) -> DocId {
        self.entries[index].doc_id
    }

    pub fn score(&self, index: usize) -> f64 {
        self.entries[index].score
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoreEntry> {
        self.entries.iter()
    }

    /// External id resolved while ranking, if any.
    pub fn cached_external_id(&self, doc_id: DocId) -> Option<&str> {
        self.external_ids.get(&doc_id).map(String::as_str)
    }

    /// Rank by score descending, ties by external id ascending, keeping `MAX_RESULTS`.
    pub fn sort_and_truncate(&mut self, corpus: &dyn CorpusAccessor) -> Result<()> {
        self.sort_and_truncate_to(corpus, MAX_RESULTS)
    }

    /// Same as `sort_and_truncate` with an explicit bound.
    ///
    /// External ids are looked up at most once per document, and only for documents that
    /// could still enter the top `limit`. Larger lists go through a bounded heap whose root
    /// is the worst entry kept so far.
    pub fn sort_and_truncate_to(&mut self, corpus: &dyn CorpusAccessor, limit: usize) -> Result<()> {
        let mut cache = std::mem::take(&mut self.external_ids);
        let entries = std::mem::take(&mut self.entries);

        let mut ranked: Vec<Ranked> = if entries.len() <= limit {
            entries.into_iter()
                .map(|entry| Ok(Ranked::new(entry, external_id(&mut cache, corpus, entry.doc_id)?)))
                .collect::<Result<_>>()?
        } else {
            select_top(entries, limit, &mut cache, corpus)?
        };
        ranked.sort();

        cache.retain(|doc_id, _| ranked.iter().any(|r| r.entry.doc_id == *doc_id));
        self.entries = ranked.into_iter().map(|r| r.entry).collect();
        self.external_ids = cache;
        Ok(())
    }
}

fn external_id(cache: &mut HashMap<DocId, String>, corpus: &dyn CorpusAccessor, doc_id: DocId) -> Result<String> {
    if let Some(id) = cache.get(&doc_id) {
        return Ok(id.clone());
    }
    let id = corpus.external_id(doc_id)?;
    cache.insert(doc_id, id.clone());
    Ok(id)
}

fn select_top(
    entries: Vec<ScoreEntry>,
    limit: usize,
    cache: &mut HashMap<DocId, String>,
    corpus: &dyn CorpusAccessor,
) -> Result<Vec<Ranked>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut heap = BinaryHeap::with_capacity(limit);
    for entry in &entries[..limit] {
        heap.push(Ranked::new(*entry, external_id(cache, corpus, entry.doc_id)?));
    }

    for entry in &entries[limit..] {
        let Some(mut worst) = heap.peek_mut() else {
            break;
        };
        // Strictly lower scores can never enter; skip them without an id lookup
        if entry.score < worst.entry.score {
            continue;
        }
        let candidate = Ranked::new(*entry, external_id(cache, corpus, entry.doc_id)?);
        if candidate < *worst {
            *worst = candidate;  // Sifts down when the guard drops
        }
    }

    Ok(heap.into_vec())
}

/// Entry paired with its external id; orders by rank, so a max-heap keeps the worst on top.
#[derive(Debug, Clone)]
struct Ranked {
    entry: ScoreEntry,
    external_id: String,
}

impl Ranked {
    fn new(entry: ScoreEntry, external_id: String) -> Self {
        Ranked { entry, external_id }
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher score ranks first, then smaller external id
        other.entry.score.total_cmp(&self.entry.score)
            .then_with(|| self.external_id.cmp(&other.external_id))
    }
}

/// Output of evaluating one operator: inverted-list producers fill the first variant,
/// score-list producers the second.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Inverted(InvertedList),
    Scores(ScoreList),
}

impl QueryResult {
    pub fn inverted_list(&self) -> Option<&InvertedList> {
        match self {
            QueryResult::Inverted(list) => Some(list),
            QueryResult::Scores(_) => None,
        }
    }

    pub fn score_list(&self) -> Option<&ScoreList> {
        match self {
            QueryResult::Scores(list) => Some(list),
            QueryResult::Inverted(_) => None,
        }
    }

    pub fn into_score_list(self) -> Option<ScoreList> {
        match self {
            QueryResult::Scores(list) => Some(list),
            QueryResult::Inverted(_) => None,
        }
    }
}
