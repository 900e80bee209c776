pub mod adapters;
pub mod producer;
pub mod types;
