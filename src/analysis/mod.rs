pub mod analyzer;
pub mod filter;
pub mod token;
pub mod tokenizer;
