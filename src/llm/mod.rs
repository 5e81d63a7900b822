pub mod action_parser;
pub mod decision;
pub mod fallback;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod replay;
pub mod sse_parser;
pub mod tools;
pub mod types;
