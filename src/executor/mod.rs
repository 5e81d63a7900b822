pub mod input;
pub mod registry;
pub mod safety;
pub mod text_input;
