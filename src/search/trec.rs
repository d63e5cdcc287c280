//! Query files and trec_eval rankings.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use crate::core::error::{Error, Result};
use crate::core::types::QueryId;
use crate::index::corpus::CorpusAccessor;
use crate::search::results::ScoreList;

/// One query of a query file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLine {
    pub id: QueryId,
    pub text: String,
}

/// Parse `<id>: <query>`.
pub fn parse_query_line(line: &str) -> Result<QueryLine> {
    let Some((id, text)) = line.split_once(':') else {
        return Err(Error::parse(format!("Query line without ':' separator: '{}'", line)));
    };
    let id = id.trim()
        .parse::<QueryId>()
        .map_err(|e| Error::parse(format!("Invalid query id in '{}': {}", line, e)))?;
    Ok(QueryLine {
        id,
        text: text.trim().to_string(),
    })
}

/// Queries in file order; blank lines are skipped.
pub fn read_queries(path: &Path) -> Result<Vec<QueryLine>> {
    let reader = BufReader::new(File::open(path)?);
    let mut queries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        queries.push(parse_query_line(&line)?);
    }
    Ok(queries)
}

/// One line of a trec_eval ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub query_id: QueryId,
    pub external_id: String,
    pub rank: u32,
    pub score: f64,
    pub run_id: String,
}

/// Parse `qid Q0 external_id rank score run_id`; the run id may be missing.
pub fn parse_ranking_line(line: &str) -> Result<RankingEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(Error::parse(format!("Ranking line needs at least 5 fields: '{}'", line)));
    }
    Ok(RankingEntry {
        query_id: fields[0].parse()?,
        external_id: fields[2].to_string(),
        rank: fields[3].parse()?,
        score: fields[4].parse()?,
        run_id: fields.get(5).map(|s| s.to_string()).unwrap_or_default(),
    })
}

/// Ranking lines grouped by query, each group in file order.
pub fn read_ranking(path: &Path) -> Result<HashMap<QueryId, Vec<RankingEntry>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ranking: HashMap<QueryId, Vec<RankingEntry>> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = parse_ranking_line(&line)?;
        ranking.entry(entry.query_id).or_default().push(entry);
    }
    Ok(ranking)
}

/// Writes rankings in trec_eval format
pub struct RankingWriter<W: Write> {
    writer: W,
    run_id: String,
}

impl<W: Write> RankingWriter<W> {
    pub fn new(writer: W, run_id: impl Into<String>) -> Self {
        RankingWriter {
            writer,
            run_id: run_id.into(),
        }
    }

    /// Write one query's ranked list; an empty list gets a single dummy line.
    pub fn write_query(&mut self, query_id: QueryId, ranked: &ScoreList, corpus: &dyn CorpusAccessor) -> Result<()> {
        if ranked.is_empty() {
            writeln!(self.writer, "{} Q0 dummy 1 0 {}", query_id, self.run_id)?;
            return Ok(());
        }

        for (rank, entry) in ranked.iter().enumerate() {
            let external_id = match ranked.cached_external_id(entry.doc_id) {
                Some(id) => id.to_string(),
                None => corpus.external_id(entry.doc_id)?,
            };
            writeln!(
                self.writer,
                "{} Q0 {} {} {:.10} {}",
                query_id, external_id, rank + 1, entry.score, self.run_id
            )?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::DocId;
    use crate::index::corpus::MemoryCorpus;

    #[test]
    fn query_lines() {
        let query = parse_query_line("10: #AND( apple pie )").unwrap();
        assert_eq!(query.id, 10);
        assert_eq!(query.text, "#AND( apple pie )");
        assert_eq!(parse_query_line("apple").unwrap_err().kind, ErrorKind::Parse);
        assert_eq!(parse_query_line("x: apple").unwrap_err().kind, ErrorKind::Parse);
    }

    #[test]
    fn ranking_lines() {
        let entry = parse_ranking_line("7 Q0 clueweb-01 3 -4.25 run-1").unwrap();
        assert_eq!(entry.query_id, 7);
        assert_eq!(entry.external_id, "clueweb-01");
        assert_eq!(entry.rank, 3);
        assert_eq!(entry.score, -4.25);
        assert!(parse_ranking_line("7 Q0 clueweb-01").is_err());
    }

    #[test]
    fn writes_ranked_lines_and_dummy_line() {
        let mut builder = MemoryCorpus::builder();
        builder.add_document("doc-a", vec![("body", vec!["x".to_string()])]).unwrap();
        let corpus = builder.build();

        let mut ranked = ScoreList::new();
        ranked.add(DocId(0), 1.5);

        let mut writer = RankingWriter::new(Vec::new(), "run-1");
        writer.write_query(3, &ranked, &corpus).unwrap();
        writer.write_query(4, &ScoreList::new(), &corpus).unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(output, "3 Q0 doc-a 1 1.5000000000 run-1\n4 Q0 dummy 1 0 run-1\n");
    }
}
