use async_trait::async_trait;

use crate::errors::DeskBenchResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, ToolDef};

/// Unified LLM provider trait. Every chat endpoint implements this.
/// New providers only need to implement this trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Sends one chat completion and returns the accumulated reply.
    /// Streaming and non-streaming endpoints both resolve to an [`LlmResponse`].
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> DeskBenchResult<LlmResponse>;
}
