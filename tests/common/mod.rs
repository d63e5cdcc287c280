#![allow(dead_code)]

use std::path::Path;

use qryeval::index::corpus::MemoryCorpus;

pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

/// Small pre-stemmed corpus shared by the pipeline tests.
pub fn news_corpus() -> MemoryCorpus {
    let mut builder = MemoryCorpus::builder();
    let docs = [
        ("GX000-01", "new york citi subwai map", "new york"),
        ("GX000-02", "york minster cathedr in york england", "york"),
        ("GX000-03", "new jersei turnpik traffic report", "new jersei"),
        ("GX000-04", "citi subwai fare increas new york", "subwai fare"),
        ("GX000-05", "garden recip tomato basil", "recip"),
    ];
    for (external_id, body, title) in docs {
        builder.add_document(external_id, vec![("body", tokens(body)), ("title", tokens(title))]).unwrap();
    }
    builder.build()
}

/// Corpus with one document per entry; each document gets a `body` field.
pub fn body_corpus(bodies: &[&str]) -> MemoryCorpus {
    let mut builder = MemoryCorpus::builder();
    for (i, body) in bodies.iter().enumerate() {
        builder.add_document(&format!("d{}", i), vec![("body", tokens(body))]).unwrap();
    }
    builder.build()
}

pub fn write_file(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

/// Parse a ranking file into `(qid, external_id, rank, score)` rows.
pub fn ranking_rows(path: &Path) -> Vec<(String, String, usize, f64)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(fields.len(), 6, "bad ranking line: {}", line);
            (
                fields[0].to_string(),
                fields[2].to_string(),
                fields[3].parse().unwrap(),
                fields[4].parse().unwrap(),
            )
        })
        .collect()
}
