use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_engine::memory::Step;

/// A named natural-language goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub prompt: String,
}

impl Task {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    /// The model gave a final answer.
    Completed,
    /// Provisioning, capture or decision failure.
    Failed,
    /// The trial itself errored or panicked.
    Error,
    StepLimitReached,
}

impl TrialStatus {
    pub fn is_success(self) -> bool {
        self == TrialStatus::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrialStatus::Completed => "completed",
            TrialStatus::Failed => "failed",
            TrialStatus::Error => "error",
            TrialStatus::StepLimitReached => "step_limit_reached",
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one trial, as collected by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub task: String,
    pub run_index: usize,
    pub status: TrialStatus,
    /// Action steps taken.
    pub steps: usize,
    pub error_message: Option<String>,
    pub run_dir: PathBuf,
}

impl TrialResult {
    pub fn error(task: &str, run_index: usize, run_dir: PathBuf, message: impl Into<String>) -> Self {
        Self {
            task: task.to_string(),
            run_index,
            status: TrialStatus::Error,
            steps: 0,
            error_message: Some(message.into()),
            run_dir,
        }
    }
}

/// Contents of a trial's `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMetadata {
    pub trial_id: String,
    pub task: String,
    pub run_index: usize,
    pub status: TrialStatus,
    #[serde(default)]
    pub answer: Option<String>,
    /// Every step of the run, images stripped.
    pub summary: Vec<Step>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
