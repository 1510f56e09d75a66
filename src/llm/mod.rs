//! LLM client boundary. The engine only needs `generate(system, user) ->
//! text` plus tolerant JSON extraction; everything provider-specific stays
//! behind the trait so tests run against scripted mocks.

pub mod json;
pub mod openai;

pub use json::{extract_json, generate_with_repair, parse_json_response};
pub use openai::OpenAiClient;

use crate::config::LlmConfig;
use std::future::Future;
use std::pin::Pin;

/// Text-in, text-out LLM boundary. Responses are expected to contain
/// parseable JSON; extraction and repair live in [`json`].
pub trait LlmClient: Send + Sync {
    /// Provider name for logs and error messages.
    fn name(&self) -> &str;

    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

/// Build a client from config. Any OpenAI-compatible endpoint works; the
/// provider name only selects defaults.
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" => Ok(Box::new(OpenAiClient::from_config(config))),
        other => anyhow::bail!("unknown llm provider: {other}"),
    }
}
