pub mod annotator;
pub mod capturer;
pub mod screenshot;
pub mod types;
