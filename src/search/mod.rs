pub mod results;
pub mod trec;
pub mod feedback;
pub mod executor;
