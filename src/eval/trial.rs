//! One trial: provision → setup → agent loop → teardown → metadata.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::loop_control::LoopConfig;
use crate::agent_engine::memory::StepMemory;
use crate::agent_engine::state::LoopState;
use crate::config::AppConfig;
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::eval::types::{Task, TrialMetadata, TrialResult, TrialStatus};
use crate::executor::registry::ActionRegistry;
use crate::llm::decision::ModelFactory;
use crate::perception::capturer::ObservationCapturer;
use crate::sandbox::guard::SandboxGuard;
use crate::sandbox::{Desktop, SandboxProvider, SandboxSpec};

#[derive(Debug, Clone)]
pub struct TrialRequest {
    pub task: Task,
    pub run_index: usize,
    pub run_dir: PathBuf,
    pub max_steps: usize,
}

/// Anything that can turn a request into a result. The orchestrator only
/// sees this seam.
#[async_trait]
pub trait TrialExecutor: Send + Sync {
    async fn run_trial(&self, req: TrialRequest) -> DeskBenchResult<TrialResult>;
}

#[derive(Debug, Clone)]
pub struct TrialSettings {
    pub sandbox: SandboxSpec,
    pub provision_timeout: Duration,
    pub setup_commands: Vec<String>,
    pub settle_delay: Duration,
    pub max_consecutive_failures: u32,
}

impl From<&AppConfig> for TrialSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            sandbox: SandboxSpec::from(&cfg.sandbox),
            provision_timeout: Duration::from_secs(cfg.sandbox.provision_timeout_secs),
            setup_commands: cfg.sandbox.setup_commands.clone(),
            settle_delay: Duration::from_millis(cfg.agent.settle_delay_ms),
            max_consecutive_failures: cfg.agent.max_consecutive_failures,
        }
    }
}

pub struct TrialRunner {
    provider: Arc<dyn SandboxProvider>,
    models: ModelFactory,
    actions: Arc<ActionRegistry>,
    settings: TrialSettings,
}

impl TrialRunner {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        models: ModelFactory,
        actions: Arc<ActionRegistry>,
        settings: TrialSettings,
    ) -> Self {
        Self {
            provider,
            models,
            actions,
            settings,
        }
    }

    pub async fn run(&self, req: TrialRequest) -> DeskBenchResult<TrialResult> {
        let started_at = Utc::now();
        tokio::fs::create_dir_all(&req.run_dir).await?;
        tokio::fs::write(req.run_dir.join("task.txt"), &req.task.prompt).await?;

        let mut memory = StepMemory::new();

        let provisioned = self.provision().await;

        let state = match provisioned {
            Ok(desktop) => {
                tracing::info!(sandbox = %desktop.id(), "sandbox ready");
                let guard = SandboxGuard::new(desktop);
                let state = self.drive(guard.desktop(), &req, &mut memory).await;
                if let Err(e) = guard.release().await {
                    tracing::warn!(error = %e, "sandbox teardown reported an error");
                }
                state
            }
            Err(e) => {
                tracing::error!(error = %e, "sandbox provisioning failed");
                LoopState::Failed { error: e.to_string() }
            }
        };

        memory.finalize();
        let (status, answer, error_message) = match state {
            LoopState::Completed { answer } => (TrialStatus::Completed, Some(answer), None),
            LoopState::Failed { error } => (TrialStatus::Failed, None, Some(error)),
            LoopState::StepLimitReached => (
                TrialStatus::StepLimitReached,
                None,
                Some(format!("step limit of {} reached", req.max_steps)),
            ),
            LoopState::Running => (TrialStatus::Error, None, Some("loop exited while running".to_string())),
        };

        let steps = memory.action_steps();
        let metadata = TrialMetadata {
            trial_id: uuid::Uuid::new_v4().to_string(),
            task: req.task.name.clone(),
            run_index: req.run_index,
            status,
            answer,
            summary: memory.steps().to_vec(),
            error_message: error_message.clone(),
            started_at,
            finished_at: Utc::now(),
        };
        tokio::fs::write(
            req.run_dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata)?,
        )
        .await?;

        tracing::info!(status = %status, steps, "trial finished");
        Ok(TrialResult {
            task: req.task.name,
            run_index: req.run_index,
            status,
            steps,
            error_message,
            run_dir: req.run_dir,
        })
    }

    /// Provisions on a separate task bounded by the provisioning timeout. A
    /// sandbox that shows up after the timeout is killed by that task rather
    /// than leaked until its own lifetime runs out.
    async fn provision(&self) -> DeskBenchResult<Box<dyn Desktop>> {
        tracing::info!(template = %self.settings.sandbox.template, "provisioning sandbox");
        let provider = self.provider.clone();
        let spec = self.settings.sandbox.clone();
        let mut pending = tokio::spawn(async move { provider.provision(&spec).await });

        let limit = self.settings.provision_timeout;
        match tokio::time::timeout(limit, &mut pending).await {
            Ok(Ok(provisioned)) => provisioned,
            Ok(Err(join)) => Err(DeskBenchError::Provisioning(format!("provisioning task failed: {join}"))),
            Err(_) => {
                tokio::spawn(async move {
                    if let Ok(Ok(late)) = pending.await {
                        tracing::warn!(sandbox = %late.id(), "sandbox arrived after timeout; killing it");
                        if let Err(e) = late.kill().await {
                            tracing::warn!(sandbox = %late.id(), error = %e, "late sandbox teardown failed");
                        }
                    }
                });
                Err(DeskBenchError::Provisioning(format!("no sandbox after {}s", limit.as_secs_f64())))
            }
        }
    }

    /// Setup commands plus the agent loop, bounded by the sandbox lifetime.
    async fn drive(&self, desktop: &dyn Desktop, req: &TrialRequest, memory: &mut StepMemory) -> LoopState {
        for cmd in &self.settings.setup_commands {
            match desktop.run_command(cmd).await {
                Ok(out) if out.exit_code != 0 => {
                    tracing::warn!(exit_code = out.exit_code, stderr = %out.stderr, "setup command failed");
                }
                Ok(_) => tracing::debug!("setup command done"),
                Err(e) => {
                    tracing::error!(error = %e, "setup command could not run");
                    return LoopState::Failed { error: e.to_string() };
                }
            }
        }

        let model = match (self.models)() {
            Ok(m) => m,
            Err(e) => return LoopState::Failed { error: e.to_string() },
        };

        let lifetime = self.settings.sandbox.timeout;
        let engine = AgentEngine::new(
            model,
            self.actions.clone(),
            ObservationCapturer::new(&req.run_dir, self.settings.settle_delay),
            LoopConfig {
                max_steps: req.max_steps,
                max_consecutive_failures: self.settings.max_consecutive_failures,
                deadline: Some(Instant::now() + lifetime),
            },
        );

        match tokio::time::timeout(lifetime, engine.run(desktop, &req.task.prompt, memory)).await {
            Ok(state) => state,
            Err(_) => {
                let last = memory.steps().last().map(|s| s.kind);
                tracing::error!(secs = lifetime.as_secs(), last_step = ?last, "trial timed out");
                LoopState::Failed {
                    error: DeskBenchError::Timeout(format!("trial exceeded {}s", lifetime.as_secs())).to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl TrialExecutor for TrialRunner {
    async fn run_trial(&self, req: TrialRequest) -> DeskBenchResult<TrialResult> {
        self.run(req).await
    }
}

