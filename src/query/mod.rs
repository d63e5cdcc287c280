pub mod ast;
pub mod parser;
pub mod daat;
pub mod evaluator;
