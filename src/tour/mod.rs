pub mod graph;
pub mod manager;
pub mod model;
