pub mod posting;
pub mod corpus;
