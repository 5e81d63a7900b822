use std::sync::Arc;

use crate::agent_engine::loop_control::{LoopConfig, LoopController, StopReason};
use crate::agent_engine::memory::{Step, StepKind, StepMemory, StepObservation};
use crate::agent_engine::prompt;
use crate::agent_engine::state::{ActionDescriptor, Decision, LoopState, ModelTurn, TrialContext};
use crate::executor::registry::{ActionRegistry, FINAL_ANSWER};
use crate::llm::decision::DecisionModel;
use crate::llm::tools::prompt_listing;
use crate::perception::capturer::ObservationCapturer;
use crate::sandbox::Desktop;

/// Drives one trial: decide → dispatch → capture → append, until a terminal
/// [`LoopState`]. The caller owns the [`StepMemory`], so partial progress
/// survives cancellation of [`AgentEngine::run`].
pub struct AgentEngine {
    model: Box<dyn DecisionModel>,
    actions: Arc<ActionRegistry>,
    capturer: ObservationCapturer,
    loop_config: LoopConfig,
}

impl AgentEngine {
    pub fn new(
        model: Box<dyn DecisionModel>,
        actions: Arc<ActionRegistry>,
        capturer: ObservationCapturer,
        loop_config: LoopConfig,
    ) -> Self {
        Self {
            model,
            actions,
            capturer,
            loop_config,
        }
    }

    /// Runs the loop to completion. Seeds `memory` with the task step when it
    /// is empty.
    pub async fn run(&self, desktop: &dyn Desktop, task: &str, memory: &mut StepMemory) -> LoopState {
        let mut ctx = TrialContext::new(desktop.screen_size());
        let system = prompt::system_prompt(ctx.screen, &prompt_listing(&self.actions));
        let mut loop_ctrl = LoopController::new(self.loop_config.clone());

        if memory.is_empty() {
            match self.capturer.capture_initial(desktop).await {
                Ok(obs) => memory.append(Step::task(task, obs.model_png, obs.saved_path)),
                Err(e) => {
                    tracing::error!(error = %e, "initial capture failed");
                    return LoopState::Failed { error: e.to_string() };
                }
            }
        }

        tracing::info!(model = %self.model.name(), max_steps = self.loop_config.max_steps, "agent loop started");

        let state = loop {
            if let Some(reason) = loop_ctrl.should_stop(memory.action_steps()) {
                tracing::info!(?reason, steps = memory.action_steps(), "loop controller triggered stop");
                break match reason {
                    StopReason::StepLimit => LoopState::StepLimitReached,
                    StopReason::Deadline => LoopState::Failed {
                        error: "trial deadline reached".into(),
                    },
                    StopReason::TooManyFailures(n) => LoopState::Failed {
                        error: format!("{n} consecutive invalid actions"),
                    },
                };
            }

            ctx.step = memory.next_index();
            let messages = prompt::build_messages(&system, memory);
            tracing::debug!(step = ctx.step, messages = messages.len(), "Planning → calling model");

            let turn = match self.model.decide(&messages).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!(step = ctx.step, error = %e, "decision failed");
                    break LoopState::Failed { error: e.to_string() };
                }
            };

            let ModelTurn {
                decision,
                goal,
                reasoning,
            } = turn;

            let descriptor = match decision {
                Decision::Finish { answer } => {
                    tracing::info!(step = ctx.step, answer = %answer, "final answer");
                    memory.append(Step {
                        index: ctx.step,
                        kind: StepKind::Final,
                        goal,
                        action: Some(ActionDescriptor::new(
                            FINAL_ANSWER,
                            serde_json::json!({ "answer": answer }),
                        )),
                        reasoning,
                        observation: StepObservation {
                            note: answer.clone(),
                            ..Default::default()
                        },
                        error: None,
                    });
                    break LoopState::Completed { answer };
                }
                Decision::Act(descriptor) => descriptor,
            };

            let previous = memory.last_action().cloned();
            let (kind, mut note, error) = match self.actions.dispatch(desktop, &ctx, &descriptor).await {
                Ok(done) => {
                    loop_ctrl.record_success();
                    ctx.last_interaction = done.point;
                    (StepKind::Action, done.message, None)
                }
                Err(e) if !e.is_trial_fatal() => {
                    loop_ctrl.record_failure();
                    tracing::warn!(
                        step = ctx.step,
                        action = %descriptor,
                        error = %e,
                        consecutive = loop_ctrl.consecutive_failures(),
                        "invalid action"
                    );
                    ctx.last_interaction = None;
                    let msg = e.to_string();
                    (
                        StepKind::Failed,
                        format!("{msg}. Now let's retry: take care not to repeat previous errors!"),
                        Some(msg),
                    )
                }
                Err(e) => {
                    tracing::error!(step = ctx.step, action = %descriptor, error = %e, "action execution failed");
                    memory.append(Step {
                        index: ctx.step,
                        kind: StepKind::Failed,
                        goal,
                        action: Some(descriptor),
                        reasoning,
                        observation: StepObservation::default(),
                        error: Some(e.to_string()),
                    });
                    break LoopState::Failed { error: e.to_string() };
                }
            };

            let obs = match self
                .capturer
                .capture(desktop, ctx.step, ctx.last_interaction.take(), previous.as_ref(), Some(&descriptor))
                .await
            {
                Ok(obs) => obs,
                Err(e) => {
                    tracing::error!(step = ctx.step, error = %e, "capture failed");
                    memory.append(Step {
                        index: ctx.step,
                        kind,
                        goal,
                        action: Some(descriptor),
                        reasoning,
                        observation: StepObservation {
                            note,
                            ..Default::default()
                        },
                        error: Some(e.to_string()),
                    });
                    break LoopState::Failed { error: e.to_string() };
                }
            };

            if !obs.note.is_empty() {
                note = format!("{note}\n{}", obs.note);
            }
            memory.append(Step {
                index: ctx.step,
                kind,
                goal,
                action: Some(descriptor),
                reasoning,
                observation: StepObservation {
                    image: Some(obs.model_png),
                    screenshot: Some(obs.saved_path),
                    note,
                },
                error,
            });
        };

        tracing::info!(state = ?state, steps = memory.action_steps(), "agent loop finished");
        state
    }
}
