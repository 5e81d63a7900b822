use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::agent_engine::memory::StepKind;
use crate::agent_engine::state::{Decision, ModelTurn};
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::eval::types::TrialMetadata;
use crate::executor::registry::FINAL_ANSWER;
use crate::llm::decision::DecisionModel;
use crate::llm::types::ChatMessage;

/// Replays the decisions recorded in a previous trial's `metadata.json`.
pub struct ReplayModel {
    label: String,
    turns: Vec<ModelTurn>,
    cursor: AtomicUsize,
}

impl ReplayModel {
    pub fn new(label: impl Into<String>, turns: Vec<ModelTurn>) -> Self {
        Self {
            label: label.into(),
            turns,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_metadata(meta: &TrialMetadata) -> Self {
        let turns = meta
            .summary
            .iter()
            .filter(|s| s.kind != StepKind::Task)
            .filter_map(|step| {
                let action = step.action.clone()?;
                let decision = if action.name == FINAL_ANSWER {
                    let answer = action
                        .arguments
                        .get("answer")
                        .and_then(|a| a.as_str())
                        .or(meta.answer.as_deref())
                        .unwrap_or_default()
                        .to_string();
                    Decision::Finish { answer }
                } else {
                    Decision::Act(action)
                };
                Some(ModelTurn {
                    decision,
                    goal: step.goal.clone(),
                    reasoning: step.reasoning.clone(),
                })
            })
            .collect();
        Self::new(format!("replay/{}", meta.trial_id), turns)
    }

    pub fn load(path: &Path) -> DeskBenchResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let meta: TrialMetadata = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), steps = meta.summary.len(), "loaded replay recording");
        Ok(Self::from_metadata(&meta))
    }

    /// A copy of this recording with the cursor rewound.
    pub fn restart(&self) -> Self {
        Self::new(self.label.clone(), self.turns.clone())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[async_trait]
impl DecisionModel for ReplayModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn decide(&self, _messages: &[ChatMessage]) -> DeskBenchResult<ModelTurn> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.turns.get(i).cloned().ok_or_else(|| {
            DeskBenchError::LlmProvider(format!(
                "replay recording exhausted after {} decisions",
                self.turns.len()
            ))
        })
    }
}
