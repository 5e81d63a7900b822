//! Two-level bounded fan-out over tasks and their repetitions.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::errors::DeskBenchResult;
use crate::eval::summary::{write_artifacts, EvaluationSummary};
use crate::eval::trial::{TrialExecutor, TrialRequest};
use crate::eval::types::{Task, TrialResult};

#[derive(Debug, Clone)]
pub struct EvalPlan {
    pub tasks: Vec<Task>,
    pub repetitions: usize,
    pub max_parallel_tasks: usize,
    pub max_parallel_repetitions: usize,
    pub max_steps: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub output_dir: PathBuf,
    /// Ordered by task (plan order), then run index.
    pub results: Vec<TrialResult>,
    pub summary: EvaluationSummary,
}

pub struct Orchestrator {
    executor: Arc<dyn TrialExecutor>,
    output_root: PathBuf,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn TrialExecutor>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            output_root: output_root.into(),
        }
    }

    pub async fn run(&self, plan: &EvalPlan) -> DeskBenchResult<BatchOutcome> {
        let started = Instant::now();
        let output_dir = self.output_root.join(format!(
            "eval_{}_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            git_short_hash().await
        ));
        tokio::fs::create_dir_all(&output_dir).await?;
        tracing::info!(
            dir = %output_dir.display(),
            tasks = plan.tasks.len(),
            repetitions = plan.repetitions,
            max_parallel_tasks = plan.max_parallel_tasks,
            max_parallel_repetitions = plan.max_parallel_repetitions,
            "evaluation started"
        );

        let task_permits = Arc::new(Semaphore::new(plan.max_parallel_tasks.max(1)));
        let mut join_set = JoinSet::new();

        for task in plan.tasks.iter().cloned() {
            let executor = self.executor.clone();
            let permits = task_permits.clone();
            let task_dir = output_dir.join(format!("example_{}", task.name));
            let span = tracing::info_span!("task", task = %task.name);
            let (repetitions, max_parallel, max_steps) =
                (plan.repetitions, plan.max_parallel_repetitions, plan.max_steps);

            join_set.spawn(
                async move {
                    let name = task.name.clone();
                    let results = match permits.acquire_owned().await {
                        Ok(_permit) => {
                            run_repetitions(executor, task, &task_dir, repetitions, max_parallel, max_steps).await
                        }
                        Err(e) => (0..repetitions)
                            .map(|i| TrialResult::error(&name, i, run_dir(&task_dir, i), e.to_string()))
                            .collect(),
                    };
                    (name, results)
                }
                .instrument(span),
            );
        }

        let mut by_task: BTreeMap<String, Vec<TrialResult>> = BTreeMap::new();
        let mut last_join_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, results)) => {
                    by_task.insert(name, results);
                }
                Err(e) => {
                    tracing::error!(error = %e, "task worker failed");
                    last_join_error = Some(e.to_string());
                }
            }
        }

        let mut results = Vec::with_capacity(plan.tasks.len() * plan.repetitions);
        for task in &plan.tasks {
            match by_task.remove(&task.name) {
                Some(task_results) => results.extend(task_results),
                None => {
                    let msg = last_join_error.clone().unwrap_or_else(|| "task worker vanished".into());
                    let task_dir = output_dir.join(format!("example_{}", task.name));
                    results.extend(
                        (0..plan.repetitions)
                            .map(|i| TrialResult::error(&task.name, i, run_dir(&task_dir, i), msg.clone())),
                    );
                }
            }
        }

        let summary = EvaluationSummary::from_results(&plan.tasks, &results);
        write_artifacts(&output_dir, &plan.tasks, &results, &summary).await?;

        for (name, rate) in &summary.example_success_rates {
            tracing::info!(task = %name, success_rate = rate, "task success rate");
        }
        tracing::info!(
            total_runs = summary.total_runs,
            total_successes = summary.total_successes,
            success_rate = summary.success_rate,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "evaluation finished"
        );

        Ok(BatchOutcome {
            output_dir,
            results,
            summary,
        })
    }
}

fn run_dir(task_dir: &Path, run_index: usize) -> PathBuf {
    task_dir.join(format!("run_{run_index}"))
}

async fn run_repetitions(
    executor: Arc<dyn TrialExecutor>,
    task: Task,
    task_dir: &Path,
    repetitions: usize,
    max_parallel: usize,
    max_steps: usize,
) -> Vec<TrialResult> {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut join_set = JoinSet::new();

    for run_index in 0..repetitions {
        let executor = executor.clone();
        let permits = permits.clone();
        let req = TrialRequest {
            task: task.clone(),
            run_index,
            run_dir: run_dir(task_dir, run_index),
            max_steps,
        };
        let span = tracing::info_span!("trial", task = %task.name, run = run_index);
        join_set.spawn(
            async move {
                let (name, dir) = (req.task.name.clone(), req.run_dir.clone());
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => executor.run_trial(req).await,
                    Err(e) => Err(crate::errors::DeskBenchError::Eval(e.to_string())),
                };
                match outcome {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, "trial errored");
                        TrialResult::error(&name, run_index, dir, e.to_string())
                    }
                }
            }
            .instrument(span),
        );
    }

    let mut by_run: BTreeMap<usize, TrialResult> = BTreeMap::new();
    let mut last_join_error = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => {
                by_run.insert(result.run_index, result);
            }
            Err(e) => {
                tracing::error!(task = %task.name, error = %e, "trial panicked");
                last_join_error = Some(e.to_string());
            }
        }
    }

    (0..repetitions)
        .map(|i| {
            by_run.remove(&i).unwrap_or_else(|| {
                let msg = last_join_error.clone().unwrap_or_else(|| "trial vanished".into());
                TrialResult::error(&task.name, i, run_dir(task_dir, i), msg)
            })
        })
        .collect()
}

/// Short hash of the working tree's HEAD, or `nogit`.
async fn git_short_hash() -> String {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if hash.is_empty() {
                "nogit".to_string()
            } else {
                hash
            }
        }
        _ => "nogit".to_string(),
    }
}
