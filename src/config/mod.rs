pub mod schema;

pub use schema::{Config, LlmConfig, SafetyConfig};
