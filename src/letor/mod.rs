pub mod features;
pub mod svm_rank;
pub mod ranker;
