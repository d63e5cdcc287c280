use std::collections::HashSet;
use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::token::Token;

/// One stage of the analysis chain. Filters may drop tokens but never renumber positions.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &str;
}

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|token| Token::new(token.text.to_lowercase(), token.position))
            .collect()
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}

/// Strips a trailing `'s` (or `’s`) so "york's" indexes as "york".
pub struct PossessiveFilter;

impl TokenFilter for PossessiveFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                for suffix in ["'s", "’s", "'S", "’S"] {
                    if let Some(stripped) = token.text.strip_suffix(suffix) {
                        token.text.truncate(stripped.len());
                        break;
                    }
                }
                token
            })
            .filter(|token| !token.text.is_empty())
            .collect()
    }

    fn name(&self) -> &str {
        "possessive"
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "for",
    "from", "has", "have", "he", "her", "his", "i", "if", "in", "into", "is",
    "it", "its", "no", "not", "of", "on", "or", "she", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "were",
    "which", "will", "with", "you",
];

/// Drops stop words; expects lowercased input.
pub struct StopWordFilter {
    stop_words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StopWordFilter {
            stop_words: stop_words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn english() -> Self {
        StopWordFilter::new(ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|token| !self.is_stop_word(&token.text))
            .collect()
    }

    fn name(&self) -> &str {
        "stop_words"
    }
}

/// Snowball stemmer. Tokens containing digits ("2014", "i5") pass through unchanged.
pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter {
            stemmer: Stemmer::create(algorithm),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|token| {
                if token.text.chars().any(|c| c.is_ascii_digit()) {
                    return token;
                }
                let stem = self.stemmer.stem(&token.text).into_owned();
                Token::new(stem, token.position)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "snowball"
    }
}
