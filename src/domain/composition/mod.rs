pub mod component;
pub mod graph;
