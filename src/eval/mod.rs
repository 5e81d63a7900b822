pub mod orchestrator;
pub mod summary;
pub mod trial;
pub mod types;
