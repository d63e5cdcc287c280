pub mod model;
pub mod scorer;
