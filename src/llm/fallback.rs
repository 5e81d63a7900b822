use async_trait::async_trait;

use crate::agent_engine::state::ModelTurn;
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::llm::decision::DecisionModel;
use crate::llm::types::ChatMessage;

/// Asks `primary`; on any failure asks `fallback` exactly once.
pub struct FallbackModel {
    label: String,
    primary: Box<dyn DecisionModel>,
    fallback: Box<dyn DecisionModel>,
}

impl FallbackModel {
    pub fn new(primary: Box<dyn DecisionModel>, fallback: Box<dyn DecisionModel>) -> Self {
        let label = format!("{} (fallback {})", primary.name(), fallback.name());
        Self {
            label,
            primary,
            fallback,
        }
    }
}

#[async_trait]
impl DecisionModel for FallbackModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn decide(&self, messages: &[ChatMessage]) -> DeskBenchResult<ModelTurn> {
        match self.primary.decide(messages).await {
            Ok(turn) => Ok(turn),
            Err(primary_err) => {
                tracing::warn!(
                    primary = %self.primary.name(),
                    fallback = %self.fallback.name(),
                    error = %primary_err,
                    "primary model failed, asking fallback"
                );
                self.fallback.decide(messages).await.map_err(|e| {
                    tracing::error!(model = %self.fallback.name(), error = %e, "fallback model failed");
                    DeskBenchError::ModelUnavailable {
                        last_error: e.to_string(),
                    }
                })
            }
        }
    }
}
