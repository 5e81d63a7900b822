use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent_engine::state::ModelTurn;
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::executor::registry::ActionRegistry;
use crate::llm::action_parser::parse_response;
use crate::llm::provider::LlmProvider;
use crate::llm::tools::tool_defs;
use crate::llm::types::{CallConfig, ChatMessage, ToolDef};

/// Chooses the next action from the rendered step history.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    /// Label used in logs, e.g. `openrouter/qwen2.5-vl`.
    fn name(&self) -> &str;

    async fn decide(&self, messages: &[ChatMessage]) -> DeskBenchResult<ModelTurn>;
}

/// Builds a fresh decision model for each trial.
pub type ModelFactory = Arc<dyn Fn() -> DeskBenchResult<Box<dyn DecisionModel>> + Send + Sync>;

/// A single OpenAI-compatible endpoint.
pub struct EndpointModel {
    label: String,
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
    tools: Vec<ToolDef>,
    registry: Arc<ActionRegistry>,
    call_timeout: Duration,
}

impl EndpointModel {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        cfg: CallConfig,
        registry: Arc<ActionRegistry>,
        use_tools: bool,
        call_timeout: Duration,
    ) -> Self {
        let label = format!("{}/{}", provider.name(), cfg.model);
        let tools = if use_tools { tool_defs(&registry) } else { Vec::new() };
        Self {
            label,
            provider,
            cfg,
            tools,
            registry,
            call_timeout,
        }
    }
}

#[async_trait]
impl DecisionModel for EndpointModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn decide(&self, messages: &[ChatMessage]) -> DeskBenchResult<ModelTurn> {
        let call = self
            .provider
            .chat(messages.to_vec(), self.tools.clone(), &self.cfg);
        let response = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| {
                DeskBenchError::Timeout(format!(
                    "{} did not answer within {}s",
                    self.label,
                    self.call_timeout.as_secs()
                ))
            })??;

        if !response.reasoning.is_empty() {
            tracing::debug!(model = %self.label, reasoning = %response.reasoning, "model reasoning");
        }
        parse_response(&response, &self.registry)
    }
}
