use rust_stemmers::Algorithm;
use crate::analysis::filter::{LowercaseFilter, PossessiveFilter, StemmerFilter, StopWordFilter, TokenFilter};
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
            name,
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// Tokenizer and filter chain, e.g. `standard > lowercase > snowball`.
    pub fn describe(&self) -> String {
        std::iter::once(self.tokenizer.name())
            .chain(self.filters.iter().map(|filter| filter.name()))
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Stems of a raw query substring; empty when every word is a stop word.
    pub fn analyze_query(&self, text: &str) -> Vec<String> {
        self.analyze(text)
            .into_iter()
            .map(|token| token.text)
            .collect()
    }

    /// Lowercase, possessives, English stop words, Snowball English stemmer
    pub fn standard_english() -> Self {
        Analyzer::new("standard_english".to_string(),
                      Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
            .add_filter(Box::new(PossessiveFilter))
            .add_filter(Box::new(StopWordFilter::english()))
            .add_filter(Box::new(StemmerFilter::new(Algorithm::English)))
    }

}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::standard_english()
    }
}
