use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::DeskBenchResult;
use crate::eval::types::{Task, TrialResult};

/// Batch-level success metrics, derived only from the trial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_runs: usize,
    pub total_successes: usize,
    pub success_rate: f64,
    pub example_success_rates: BTreeMap<String, f64>,
    pub example_success_counts: BTreeMap<String, usize>,
}

fn rate(successes: usize, runs: usize) -> f64 {
    if runs == 0 {
        0.0
    } else {
        successes as f64 / runs as f64
    }
}

impl EvaluationSummary {
    /// Every task in `tasks` gets an entry, even with no results.
    pub fn from_results(tasks: &[Task], results: &[TrialResult]) -> Self {
        let mut runs: BTreeMap<String, usize> = tasks.iter().map(|t| (t.name.clone(), 0)).collect();
        let mut successes: BTreeMap<String, usize> = runs.clone();

        for r in results {
            *runs.entry(r.task.clone()).or_default() += 1;
            let ok = successes.entry(r.task.clone()).or_default();
            if r.status.is_success() {
                *ok += 1;
            }
        }

        let example_success_rates = runs
            .iter()
            .map(|(name, n)| (name.clone(), rate(successes.get(name).copied().unwrap_or(0), *n)))
            .collect();
        let total_runs = results.len();
        let total_successes = results.iter().filter(|r| r.status.is_success()).count();

        Self {
            total_runs,
            total_successes,
            success_rate: rate(total_successes, total_runs),
            example_success_rates,
            example_success_counts: successes,
        }
    }
}

/// Writes `examples.json`, `results.json` and `summary.json` into `dir`.
pub async fn write_artifacts(
    dir: &Path,
    tasks: &[Task],
    results: &[TrialResult],
    summary: &EvaluationSummary,
) -> DeskBenchResult<()> {
    let examples: BTreeMap<&str, &str> = tasks
        .iter()
        .map(|t| (t.name.as_str(), t.prompt.as_str()))
        .collect();
    tokio::fs::write(dir.join("examples.json"), serde_json::to_string_pretty(&examples)?).await?;
    tokio::fs::write(dir.join("results.json"), serde_json::to_string_pretty(results)?).await?;
    tokio::fs::write(dir.join("summary.json"), serde_json::to_string_pretty(summary)?).await?;
    tracing::info!(dir = %dir.display(), "evaluation artifacts written");
    Ok(())
}
