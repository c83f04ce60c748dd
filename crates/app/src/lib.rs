pub mod pipeline;
pub mod settings;
